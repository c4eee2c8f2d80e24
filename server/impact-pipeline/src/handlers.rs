//! HTTP handlers for the impact pipeline (internal surface).

use axum::{
  extract::{Path, State},
  http::StatusCode,
  Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use impact_engine::{RiskAssessment, RiskFeatureVector};

use crate::pipeline::Pipeline;
use crate::types::{ChangeEvent, EventRecord, SubmitOutcome};

pub async fn health() -> &'static str {
  "ok"
}

/// Hand-off: 202 when accepted, 200 with `duplicate` for a known delivery id.
pub async fn submit_event(
  State(pipeline): State<Arc<Pipeline>>,
  Json(event): Json<ChangeEvent>,
) -> (StatusCode, Json<Value>) {
  match pipeline.submit(event).await {
    Ok(SubmitOutcome::Accepted(record)) => (
      StatusCode::ACCEPTED,
      Json(json!({
        "status": "accepted",
        "delivery_id": record.delivery_id,
        "analysis_id": record.analysis_id,
      })),
    ),
    Ok(SubmitOutcome::Duplicate(record)) => (
      StatusCode::OK,
      Json(json!({
        "status": "duplicate",
        "delivery_id": record.delivery_id,
        "analysis_id": record.analysis_id,
        "event_status": record.status,
      })),
    ),
    Err(e) => {
      warn!(error = %e, "event rejected");
      (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
    }
  }
}

pub async fn get_event(
  State(pipeline): State<Arc<Pipeline>>,
  Path(delivery_id): Path<String>,
) -> Result<Json<EventRecord>, StatusCode> {
  pipeline
    .log()
    .get(&delivery_id)
    .await
    .map(Json)
    .ok_or(StatusCode::NOT_FOUND)
}

/// Score a raw feature vector; unknown categorical values take their defaults.
pub async fn impact_analysis(
  State(pipeline): State<Arc<Pipeline>>,
  Json(features): Json<RiskFeatureVector>,
) -> Json<RiskAssessment> {
  Json(pipeline.score_features(&features))
}
