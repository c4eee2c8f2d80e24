//! Event, record and report types for the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use impact_engine::{
  ClassifiedChange, ImpactSurface, Prioritization, RiskAssessment, RiskFeatureVector,
};

/// One change event handed off by the intake layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub delivery_id: String,
  /// `owner/name`.
  pub repository: String,
  pub before: String,
  pub after: String,
  #[serde(default)]
  pub branch: Option<String>,
  /// Unified diff supplied by the hosting API, used when git access fails.
  #[serde(default)]
  pub patch: Option<String>,
  /// After-revision contents for the patch path, keyed by file path.
  #[serde(default)]
  pub files: BTreeMap<String, String>,
}

impl ChangeEvent {
  /// Empty or all-zero `before`: new branch or initial push.
  pub fn is_initial_push(&self) -> bool {
    self.before.trim().chars().all(|c| c == '0')
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

/// Where the diff for a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionOrigin {
  Git,
  Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
  pub origin: RevisionOrigin,
  pub analysis: ClassifiedChange,
  pub features: RiskFeatureVector,
  pub surface: ImpactSurface,
  pub structural_risk_score: f64,
  pub assessment: RiskAssessment,
  /// Present for Medium and High risk.
  pub prioritization: Option<Prioritization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
  pub id: Uuid,
  pub delivery_id: String,
  pub repository: String,
  pub before: String,
  pub after: String,
  pub analysis_id: String,
  pub status: EventStatus,
  pub received_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
  pub report: Option<AnalysisReport>,
  pub note: Option<String>,
  pub error: Option<String>,
}

/// Result of handing an event to the log.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
  Accepted(EventRecord),
  Duplicate(EventRecord),
}
