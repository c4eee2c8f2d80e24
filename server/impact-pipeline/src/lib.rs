//! Change Impact Pipeline
//!
//! Runs the impact engine per change event, off the request path, against a
//! local bare clone of the repository. Bind to 127.0.0.1 by default (internal only).

mod collab;
mod config;
mod error;
mod git;
mod handlers;
mod pipeline;
mod store;
mod types;

use axum::{
  routing::{get, post},
  Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use collab::{EventPatchFallback, FallbackSource, TestGenerator};
pub use config::Config;
pub use error::PipelineError;
pub use git::{GitRevisionSource, WorkdirManager};
pub use handlers::{get_event, health, impact_analysis, submit_event};
pub use pipeline::Pipeline;
pub use store::{analysis_id, EventLog};
pub use types::*;

/// All routes over one shared pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/events", post(submit_event))
    .route("/events/:delivery_id", get(get_event))
    .route("/impact-analysis", post(impact_analysis))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(pipeline)
}
