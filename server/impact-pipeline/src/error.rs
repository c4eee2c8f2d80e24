//! Structured error types for the impact pipeline.

use impact_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("engine: {0}")]
  Engine(#[from] EngineError),

  #[error("git: {0}")]
  Git(#[from] git2::Error),

  #[error("clone timeout: {repo} exceeded {secs}s")]
  CloneTimeout { repo: String, secs: u64 },

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("task: {0}")]
  Task(String),

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },
}

impl PipelineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn clone_timeout(repo: impl Into<String>, secs: u64) -> Self {
    Self::CloneTimeout {
      repo: repo.into(),
      secs,
    }
  }

  /// Working-directory failures that another revision source can stand in for.
  pub fn wants_fallback(&self) -> bool {
    match self {
      Self::CloneTimeout { .. } | Self::Git(_) => true,
      Self::Engine(e) => e.is_recoverable(),
      _ => false,
    }
  }
}

impl From<tokio::task::JoinError> for PipelineError {
  fn from(e: tokio::task::JoinError) -> Self {
    Self::Task(e.to_string())
  }
}
