// elfwatch/src/engine/scorer.rs
//
// Weighted risk scoring. Two independent paths:
//
//   score()  — plain local score from averaged behavior metrics
//     value = 0.4·suspicious + 0.2·(10 − tasks) + 0.2·(10 − attendance)
//           + 0.2·(materials / 10)
//     > 0.70 HIGH   > 0.40 MEDIUM   else LOW
//
//   blend()  — local value merged with an insight provider's 0–10 opinion
//     combined = 0.4·local + 0.6·(external / 10)
//     > 0.70 CRITICAL   > 0.50 HIGH   > 0.30 MEDIUM   else LOW
//
// Inputs are on a 0–10 scale while thresholds are on 0–1, so most real
// workloads land in HIGH. Reported values are clamped to [0, 1]; the clamp
// never moves a value across a threshold.

use crate::records::{EnhancedAssessment, InsightOpinion, RiskAssessment, RiskMetrics, RiskTier};

const W_SUSPICIOUS: f64 = 0.4;
const W_TASKS:      f64 = 0.2;
const W_ATTENDANCE: f64 = 0.2;
const W_MATERIALS:  f64 = 0.2;

const PLAIN_HIGH:   f64 = 0.7;
const PLAIN_MEDIUM: f64 = 0.4;

const W_LOCAL:    f64 = 0.4;
const W_EXTERNAL: f64 = 0.6;

const BLEND_CRITICAL: f64 = 0.7;
const BLEND_HIGH:     f64 = 0.5;
const BLEND_MEDIUM:   f64 = 0.3;

/// Unclamped weighted sum.
pub fn raw_score(m: &RiskMetrics) -> f64 {
    m.average_suspicious_score * W_SUSPICIOUS
        + (10.0 - m.tasks_completed) * W_TASKS
        + (10.0 - m.attendance_rate) * W_ATTENDANCE
        + (m.materials_accessed / 10.0) * W_MATERIALS
}

pub fn plain_tier(value: f64) -> RiskTier {
    if value > PLAIN_HIGH {
        RiskTier::High
    } else if value > PLAIN_MEDIUM {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

pub fn score(m: &RiskMetrics) -> RiskAssessment {
    let raw = raw_score(m);
    RiskAssessment { value: clamp_unit(raw), tier: plain_tier(raw) }
}

pub fn blended_tier(value: f64) -> RiskTier {
    if value > BLEND_CRITICAL {
        RiskTier::Critical
    } else if value > BLEND_HIGH {
        RiskTier::High
    } else if value > BLEND_MEDIUM {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// `local_value` is a plain score value; `external_value` is on 0–10.
pub fn blend(local_value: f64, external_value: f64) -> RiskAssessment {
    let combined = W_LOCAL * local_value + W_EXTERNAL * (external_value / 10.0);
    RiskAssessment { value: clamp_unit(combined), tier: blended_tier(combined) }
}

/// Blend a plain assessment with a provider opinion into the enhanced form.
/// The label is taken from the rounded score that is reported.
pub fn enhance(local: &RiskAssessment, opinion: &InsightOpinion) -> EnhancedAssessment {
    let external = opinion.risk_level.clamp(0.0, 10.0);
    let blended  = blend(local.value, external);
    let reported = (blended.value * 10000.0).round() / 10000.0;
    EnhancedAssessment {
        combined_risk_score:      reported,
        risk_level:               blended_tier(reported),
        ai_insights:              opinion.suspicious_patterns.clone(),
        recommended_actions:      opinion.recommended_actions.clone(),
        psychological_assessment: opinion.psychological_assessment.clone(),
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
