//! Structured error types for the impact engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("revision not found: {revision}")]
  RevisionNotFound { revision: String },

  #[error("diff timeout: {operation} exceeded {secs}s")]
  DiffTimeout { operation: String, secs: u64 },

  #[error("syntax error in {path} at line {line}: {message}")]
  Syntax {
    path: String,
    line: usize,
    message: String,
  },

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("revision source: {0}")]
  Source(String),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn revision_not_found(revision: impl Into<String>) -> Self {
    Self::RevisionNotFound {
      revision: revision.into(),
    }
  }

  pub fn diff_timeout(operation: impl Into<String>, secs: u64) -> Self {
    Self::DiffTimeout {
      operation: operation.into(),
      secs,
    }
  }

  pub fn source(msg: impl Into<String>) -> Self {
    Self::Source(msg.into())
  }

  /// Timeouts are recoverable: the caller should retry with another revision source.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::DiffTimeout { .. })
  }
}
