//! In-memory event log keyed by delivery id. Each delivery is processed at most once.

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::types::*;

/// Stable id for one repository revision pair: `ana-` + 16 hex chars.
pub fn analysis_id(repository: &str, before: &str, after: &str) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(repository.as_bytes());
  hasher.update(b"|");
  hasher.update(before.as_bytes());
  hasher.update(b"|");
  hasher.update(after.as_bytes());
  let hex = hasher.finalize().to_hex();
  format!("ana-{}", &hex[..16])
}

#[derive(Default)]
pub struct EventLog {
  records: RwLock<HashMap<String, EventRecord>>,
}

impl EventLog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a pending record, or return the existing one for a known delivery id.
  pub async fn submit(&self, event: &ChangeEvent) -> SubmitOutcome {
    let mut records = self.records.write().await;
    if let Some(existing) = records.get(&event.delivery_id) {
      debug!(delivery_id = %event.delivery_id, "duplicate delivery");
      return SubmitOutcome::Duplicate(existing.clone());
    }
    let record = EventRecord {
      id: Uuid::new_v4(),
      delivery_id: event.delivery_id.clone(),
      repository: event.repository.clone(),
      before: event.before.clone(),
      after: event.after.clone(),
      analysis_id: analysis_id(&event.repository, &event.before, &event.after),
      status: EventStatus::Pending,
      received_at: Utc::now(),
      started_at: None,
      finished_at: None,
      report: None,
      note: None,
      error: None,
    };
    records.insert(event.delivery_id.clone(), record.clone());
    SubmitOutcome::Accepted(record)
  }

  pub async fn get(&self, delivery_id: &str) -> Option<EventRecord> {
    self.records.read().await.get(delivery_id).cloned()
  }

  pub async fn mark_processing(&self, delivery_id: &str) {
    self
      .update(delivery_id, |r| {
        r.status = EventStatus::Processing;
        r.started_at = Some(Utc::now());
      })
      .await;
  }

  pub async fn complete(&self, delivery_id: &str, report: Option<AnalysisReport>, note: Option<String>) {
    self
      .update(delivery_id, |r| {
        r.status = EventStatus::Completed;
        r.finished_at = Some(Utc::now());
        r.report = report;
        r.note = note;
      })
      .await;
  }

  pub async fn fail(&self, delivery_id: &str, message: String) {
    self
      .update(delivery_id, |r| {
        r.status = EventStatus::Failed;
        r.finished_at = Some(Utc::now());
        r.error = Some(message);
      })
      .await;
  }

  async fn update(&self, delivery_id: &str, apply: impl FnOnce(&mut EventRecord)) {
    if let Some(record) = self.records.write().await.get_mut(delivery_id) {
      apply(record);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn event(id: &str) -> ChangeEvent {
    ChangeEvent {
      delivery_id: id.to_string(),
      repository: "acme/shop".to_string(),
      before: "a1".to_string(),
      after: "b2".to_string(),
      branch: None,
      patch: None,
      files: BTreeMap::new(),
    }
  }

  #[test]
  fn analysis_id_is_stable_and_prefixed() {
    let a = analysis_id("acme/shop", "a1", "b2");
    assert_eq!(a, analysis_id("acme/shop", "a1", "b2"));
    assert!(a.starts_with("ana-"));
    assert_eq!(a.len(), 20);
    assert_ne!(a, analysis_id("acme/shop", "a1", "b3"));
  }

  #[tokio::test]
  async fn second_submit_is_a_duplicate() {
    let log = EventLog::new();
    assert!(matches!(log.submit(&event("d1")).await, SubmitOutcome::Accepted(_)));
    match log.submit(&event("d1")).await {
      SubmitOutcome::Duplicate(r) => assert_eq!(r.status, EventStatus::Pending),
      other => panic!("expected duplicate, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn records_move_through_statuses() {
    let log = EventLog::new();
    log.submit(&event("d2")).await;
    log.mark_processing("d2").await;
    assert_eq!(log.get("d2").await.unwrap().status, EventStatus::Processing);

    log.fail("d2", "revision not found: b2".to_string()).await;
    let r = log.get("d2").await.unwrap();
    assert_eq!(r.status, EventStatus::Failed);
    assert_eq!(r.error.as_deref(), Some("revision not found: b2"));
    assert!(r.finished_at.is_some());
    assert!(log.get("missing").await.is_none());
  }
}
