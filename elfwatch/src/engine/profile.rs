// elfwatch/src/engine/profile.rs
//
// Entity profile builder. Joins one elf's behavior rows (averaged into
// RiskMetrics), five most recent messages and first schedule row into a
// single report. Name matching is exact and case-sensitive.
//
// The enriched variant makes at most one insight call per profile. Any
// provider failure is logged and the plain profile is returned unchanged.

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::scorer;
use crate::insight::InsightProvider;
use crate::loader::Tables;
use crate::records::{
    Analysis, Assignment, BehaviorRecord, EntityProfile, NotFound, Prediction, RiskMetrics,
};

pub const RECENT_MESSAGES: usize = 5;

/// Messages from the recent window that feed the prediction prompt.
const PREDICTION_CONTEXT: usize = 3;

/// Per-field mean over the cells that are present. A field with no values
/// at all averages to 0.
pub fn average_metrics(rows: &[&BehaviorRecord]) -> RiskMetrics {
    RiskMetrics {
        average_suspicious_score: mean_present(rows.iter().map(|r| r.suspicious_score)),
        tasks_completed:          mean_present(rows.iter().map(|r| r.tasks_completed)),
        attendance_rate:          mean_present(rows.iter().map(|r| r.attendance_rate)),
        materials_accessed:       mean_present(rows.iter().map(|r| r.materials_accessed)),
    }
}

pub(crate) fn mean_present(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, n) = values.flatten().fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Plain-path analysis.
pub fn analyze(tables: &Tables, name: &str) -> Analysis {
    let rows = tables.behavior_for(name);
    if rows.is_empty() {
        debug!("No behavior rows for {:?}", name);
        return Analysis::NotFound(NotFound::elf(name));
    }

    let risk_metrics = average_metrics(&rows);
    let assessment   = scorer::score(&risk_metrics);

    let recent_communications = tables.recent_communications(name, RECENT_MESSAGES)
        .into_iter()
        .map(|c| c.message.clone())
        .collect();

    let current_assignment = tables.schedule_for(name)
        .map(Assignment::from)
        .unwrap_or_default();

    Analysis::Profile(Box::new(EntityProfile {
        elf_name: name.to_string(),
        risk_metrics,
        assessment,
        recent_communications,
        current_assignment,
        timestamp: Utc::now(),
        ai_assessment: None,
    }))
}

/// Blended-path analysis: plain profile plus one insight call.
pub async fn analyze_enriched(
    tables:   &Tables,
    name:     &str,
    provider: &dyn InsightProvider,
) -> Analysis {
    let mut analysis = analyze(tables, name);
    if let Analysis::Profile(profile) = &mut analysis {
        match provider.analyze_communications(&profile.recent_communications, name).await {
            Ok(opinion) => {
                let enhanced = scorer::enhance(&profile.assessment, &opinion);
                debug!(
                    "Insight for {} via {}: external={:.1} combined={:.4} {}",
                    name, provider.name(), opinion.risk_level,
                    enhanced.combined_risk_score, enhanced.risk_level
                );
                profile.ai_assessment = Some(enhanced);
            }
            Err(e) => warn!("Insight unavailable for {} ({}): {}", name, provider.name(), e),
        }
    }
    analysis
}

/// Behavior prediction for one elf. None when the elf has no behavior rows.
pub async fn predict(
    tables:   &Tables,
    name:     &str,
    provider: Option<&dyn InsightProvider>,
) -> Option<Prediction> {
    let rows = tables.behavior_for(name);
    if rows.is_empty() {
        return None;
    }
    let metrics = average_metrics(&rows);

    // Oldest-to-newest, like a transcript tail.
    let mut recent: Vec<String> = tables.recent_communications(name, PREDICTION_CONTEXT)
        .into_iter()
        .map(|c| c.message.clone())
        .collect();
    recent.reverse();

    let prediction = match provider {
        Some(p) => match p.predict_behavior(name, &metrics, &recent).await {
            Ok(pred) => Some(pred),
            Err(e) => {
                warn!("Prediction unavailable for {} ({}): {}", name, p.name(), e);
                None
            }
        },
        None => None,
    };

    Some(Prediction { elf_name: name.to_string(), prediction, timestamp: Utc::now() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::testing::{FailingProvider, FixedProvider};
    use crate::loader::tests::{write_dataset, BEHAVIOR, COMMS, SCHEDULE};
    use crate::records::RiskTier;

    fn tables() -> Tables {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        Tables::load(dir.path()).unwrap()
    }

    #[test]
    fn unknown_elf_is_not_found() {
        let t = tables();
        match analyze(&t, "Nobody") {
            Analysis::NotFound(nf) => assert_eq!(nf.error, "No behavior data found for elf: Nobody"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn name_match_is_case_sensitive() {
        let t = tables();
        assert!(analyze(&t, "jingle").profile().is_none());
    }

    #[test]
    fn metrics_are_arithmetic_means() {
        let t = tables();
        let a = analyze(&t, "Jingle");
        let p = a.profile().unwrap();
        let m = p.risk_metrics;
        assert!((m.average_suspicious_score - 3.0).abs() < 1e-9);
        assert!((m.tasks_completed - 7.0).abs() < 1e-9);
        assert!((m.attendance_rate - 8.0).abs() < 1e-9);
        assert!((m.materials_accessed - 20.0).abs() < 1e-9);
        // 1.2 + 0.6 + 0.4 + 0.4
        assert_eq!(p.assessment.tier, RiskTier::High);
    }

    #[test]
    fn blank_cells_are_left_out_of_the_mean() {
        let behavior = "\
Elf_Name,Suspicious_Activity_Score,Tasks_Completed,Shift_Attendance,Materials_Accessed
Jingle,2,8,9,10
Jingle,4,6,7,
Jingle,,,,
";
        let dir = write_dataset(behavior, COMMS, SCHEDULE);
        let t = Tables::load(dir.path()).unwrap();
        assert_eq!(t.behavior[1].materials_accessed, None);

        let a = analyze(&t, "Jingle");
        let m = a.profile().unwrap().risk_metrics;
        assert!((m.average_suspicious_score - 3.0).abs() < 1e-9);
        assert!((m.tasks_completed - 7.0).abs() < 1e-9);
        assert!((m.materials_accessed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn field_with_no_values_averages_to_zero() {
        let row = BehaviorRecord {
            elf_name:           "Jingle".into(),
            suspicious_score:   Some(1.0),
            tasks_completed:    None,
            attendance_rate:    Some(10.0),
            materials_accessed: None,
        };
        let m = average_metrics(&[&row]);
        assert_eq!(m.average_suspicious_score, 1.0);
        assert_eq!(m.tasks_completed, 0.0);
        assert_eq!(m.materials_accessed, 0.0);
        assert_eq!(average_metrics(&[]), RiskMetrics::default());
    }

    #[test]
    fn profile_joins_messages_and_schedule() {
        let t = tables();
        let a = analyze(&t, "Jingle");
        let p = a.profile().unwrap();
        assert_eq!(p.recent_communications, vec!["sixth", "fifth", "fourth", "third", "second"]);
        assert_eq!(p.current_assignment.production_line.as_deref(), Some("Wrapping"));
        assert_eq!(p.current_assignment.days_off.as_deref(), Some("Sunday"));
        assert!(p.ai_assessment.is_none());
    }

    #[test]
    fn missing_schedule_and_messages_yield_nulls() {
        let t = tables();
        let a = analyze(&t, "Sprinkle");
        let p = a.profile().unwrap();
        assert_eq!(p.recent_communications, vec!["not jingle"]);
        assert_eq!(p.current_assignment, Assignment::default());
        assert_eq!(p.assessment.tier, RiskTier::Low);

        let v = serde_json::to_value(&a).unwrap();
        assert!(v["current_assignment"]["production_line"].is_null());
        assert!(v.get("ai_assessment").is_none());
    }

    #[tokio::test]
    async fn enrichment_failure_still_returns_profile() {
        let t = tables();
        let a = analyze_enriched(&t, "Jingle", &FailingProvider).await;
        let p = a.profile().expect("profile survives insight failure");
        assert!(p.ai_assessment.is_none());
        assert_eq!(p.assessment.tier, RiskTier::High);
    }

    #[tokio::test]
    async fn enrichment_success_attaches_blended_assessment() {
        let t = tables();
        let a = analyze_enriched(&t, "Sprinkle", &FixedProvider::new(10.0)).await;
        let e = a.profile().unwrap().ai_assessment.clone().unwrap();
        // local 0.0, external 10 → 0.6
        assert!((e.combined_risk_score - 0.6).abs() < 1e-9);
        assert_eq!(e.risk_level, RiskTier::High);
    }

    #[tokio::test]
    async fn enrichment_skips_unknown_elves() {
        let t = tables();
        let a = analyze_enriched(&t, "Nobody", &FixedProvider::new(10.0)).await;
        assert!(matches!(a, Analysis::NotFound(_)));
    }

    #[tokio::test]
    async fn prediction_without_provider_is_null() {
        let t = tables();
        let p = predict(&t, "Jingle", None).await.unwrap();
        assert!(p.prediction.is_none());
        assert!(predict(&t, "Nobody", None).await.is_none());
    }

    #[tokio::test]
    async fn prediction_uses_provider() {
        let t = tables();
        let provider = FixedProvider::new(3.0);
        let p = predict(&t, "Jingle", Some(&provider)).await.unwrap();
        assert_eq!(p.prediction.unwrap().sabotage_risk_24h, 3.0);
    }
}
