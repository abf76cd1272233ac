// elfwatch/src/records.rs
//
// Shared record types and all domain types flowing through elfwatch.
// Row structs mirror the CSV column sets in the data directory; the
// derived types (metrics, assessments, profiles) are rebuilt per request
// and never written back.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Raw rows from the data directory ──────────────────────────────────────────

/// One behavior observation for one elf. A blank numeric cell is None and
/// is left out of every mean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BehaviorRecord {
    #[serde(rename = "Elf_Name")]
    pub elf_name: String,
    #[serde(rename = "Suspicious_Activity_Score")]
    pub suspicious_score: Option<f64>,
    #[serde(rename = "Tasks_Completed")]
    pub tasks_completed: Option<f64>,
    #[serde(rename = "Shift_Attendance")]
    pub attendance_rate: Option<f64>,
    #[serde(rename = "Materials_Accessed")]
    pub materials_accessed: Option<f64>,
}

impl BehaviorRecord {
    pub const COLUMNS: &'static [&'static str] = &[
        "Elf_Name",
        "Suspicious_Activity_Score",
        "Tasks_Completed",
        "Shift_Attendance",
        "Materials_Accessed",
    ];
}

/// One message sent by an elf.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommunicationRecord {
    #[serde(rename = "Elf_Name")]
    pub elf_name: String,
    #[serde(rename = "Time_Sent")]
    pub time_sent: String,
    #[serde(rename = "Message")]
    pub message: String,
}

// Accepted `Time_Sent` layouts, tried in order after RFC 3339.
const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

impl CommunicationRecord {
    pub const COLUMNS: &'static [&'static str] = &["Elf_Name", "Time_Sent", "Message"];

    /// Parsed send time. None when `Time_Sent` matches no known layout;
    /// such rows sort below every parsed row.
    pub fn sent_at(&self) -> Option<NaiveDateTime> {
        let raw = self.time_sent.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }
}

/// Production line assignment for one elf.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleRecord {
    #[serde(rename = "Elf_Name")]
    pub elf_name: String,
    #[serde(rename = "Assigned_Production_Line")]
    pub production_line: String,
    #[serde(rename = "Days_Off")]
    pub days_off: Option<String>,
}

impl ScheduleRecord {
    pub const COLUMNS: &'static [&'static str] =
        &["Elf_Name", "Assigned_Production_Line", "Days_Off"];
}

// ── Risk types ────────────────────────────────────────────────────────────────

/// Per-elf mean of the four behavior fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub average_suspicious_score: f64,
    pub tasks_completed: f64,
    pub attendance_rate: f64,
    pub materials_accessed: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(rename = "risk_score")]
    pub value: f64,
    #[serde(rename = "risk_level")]
    pub tier: RiskTier,
}

/// Structured opinion returned by an insight provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightOpinion {
    /// 0–10 scale.
    pub risk_level: f64,
    pub suspicious_patterns: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub psychological_assessment: Option<String>,
}

/// Local score blended with an insight provider's opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedAssessment {
    pub combined_risk_score: f64,
    pub risk_level: RiskTier,
    pub ai_insights: Vec<String>,
    pub recommended_actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psychological_assessment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPrediction {
    pub predicted_actions: Vec<String>,
    /// 0–10 scale.
    pub sabotage_risk_24h: f64,
    pub preventive_measures: Vec<String>,
}

// ── Profiles ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub production_line: Option<String>,
    pub days_off: Option<String>,
}

impl From<&ScheduleRecord> for Assignment {
    fn from(s: &ScheduleRecord) -> Self {
        Self {
            production_line: Some(s.production_line.clone()),
            days_off: s.days_off.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub elf_name: String,
    pub risk_metrics: RiskMetrics,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub recent_communications: Vec<String>,
    pub current_assignment: Assignment,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_assessment: Option<EnhancedAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotFound {
    pub error: String,
}

impl NotFound {
    pub fn elf(name: &str) -> Self {
        Self { error: format!("No behavior data found for elf: {}", name) }
    }
}

/// Result of analyzing one elf. Serializes as either the profile or the
/// `{"error": ...}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Profile(Box<EntityProfile>),
    NotFound(NotFound),
}

impl Analysis {
    pub fn profile(&self) -> Option<&EntityProfile> {
        match self {
            Self::Profile(p) => Some(p),
            Self::NotFound(_) => None,
        }
    }

    pub fn tier(&self) -> Option<RiskTier> {
        self.profile().map(|p| p.assessment.tier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub elf_name: String,
    pub prediction: Option<BehaviorPrediction>,
    pub timestamp: DateTime<Utc>,
}

// ── Workshop rollup ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkshopState {
    Stable,
    Compromised,
}

impl std::fmt::Display for WorkshopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "STABLE"),
            Self::Compromised => write!(f, "COMPROMISED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkshopSummary {
    pub total_elves: usize,
    pub high_risk_count: usize,
    pub average_suspicious_score: f64,
    pub status: WorkshopState,
}
