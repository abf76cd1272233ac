// elfwatch/src/insight/mod.rs
//
// External insight providers — remote language-model services that read an
// elf's messages and return a structured risk opinion.
//
// Providers are optional collaborators. Every failure mode (missing key,
// network, HTTP status, timeout, unparsable reply) surfaces as InsightError
// and callers fall back to the local score. One attempt per call; no retry.

pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::records::{BehaviorPrediction, InsightOpinion, RiskMetrics};

pub use openai::OpenAiInsight;

/// Neutral midpoint used when a reply omits its 0–10 rating.
pub const DEFAULT_RISK_LEVEL: f64 = 5.0;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("API key not found in environment ({0})")]
    MissingApiKey(&'static str),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

#[async_trait]
pub trait InsightProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Rate a batch of messages from one elf.
    async fn analyze_communications(
        &self,
        messages: &[String],
        subject:  &str,
    ) -> Result<InsightOpinion, InsightError>;

    /// Forecast near-term behavior from history and the latest messages.
    async fn predict_behavior(
        &self,
        subject: &str,
        metrics: &RiskMetrics,
        recent:  &[String],
    ) -> Result<BehaviorPrediction, InsightError>;

    /// Round-trip a trivial prompt; returns the raw reply text.
    async fn probe(&self) -> Result<String, InsightError>;
}

// ── Reply parsing ─────────────────────────────────────────────────────────────

/// Pull the JSON object out of a model reply that may wrap it in prose or a
/// fenced code block.
pub fn extract_json(text: &str) -> Result<&str, InsightError> {
    let text = text.trim();

    if text.starts_with('{') && text.ends_with('}') {
        return Ok(text);
    }

    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if !inner.is_empty() {
                return Ok(inner);
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Ok(&text[start..=end]);
        }
    }

    let preview: String = text.chars().take(100).collect();
    Err(InsightError::MalformedReply(format!("no JSON object in reply: {}", preview)))
}

/// Accept a number or a numeric string ("7", "7/10").
pub(crate) fn rating(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.split('/').next()?.trim().parse().ok(),
        _ => None,
    }
}

/// Accept a list of strings, a list of objects, or a single string.
pub(crate) fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter()
            .map(|i| match i {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub fn parse_opinion(reply: &str) -> Result<InsightOpinion, InsightError> {
    let v: Value = serde_json::from_str(extract_json(reply)?)
        .map_err(|e| InsightError::MalformedReply(e.to_string()))?;
    if !v.is_object() {
        return Err(InsightError::MalformedReply("reply is not a JSON object".into()));
    }

    let risk_level = ["risk_level", "risk_score"].iter()
        .find_map(|k| rating(&v[*k]))
        .unwrap_or(DEFAULT_RISK_LEVEL);

    Ok(InsightOpinion {
        risk_level,
        suspicious_patterns:      string_list(&v["suspicious_patterns"]),
        recommended_actions:      string_list(&v["recommended_actions"]),
        psychological_assessment: v["psychological_assessment"].as_str().map(str::to_string),
    })
}

pub fn parse_prediction(reply: &str) -> Result<BehaviorPrediction, InsightError> {
    let v: Value = serde_json::from_str(extract_json(reply)?)
        .map_err(|e| InsightError::MalformedReply(e.to_string()))?;
    if !v.is_object() {
        return Err(InsightError::MalformedReply("reply is not a JSON object".into()));
    }

    Ok(BehaviorPrediction {
        predicted_actions:   string_list(&v["predicted_actions"]),
        sabotage_risk_24h:   rating(&v["sabotage_risk_24h"]).unwrap_or(DEFAULT_RISK_LEVEL),
        preventive_measures: string_list(&v["preventive_measures"]),
    })
}

// ── Test doubles ──────────────────────────────────────────────────────────────
