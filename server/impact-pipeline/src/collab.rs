//! Collaborator seams: the test generator and the fallback revision source.

use impact_engine::{CandidateTest, EngineError, PatchSet};

use crate::types::ChangeEvent;

/// Natural-language test generation. Errors and empty results fall back to
/// domain-derived candidates.
pub trait TestGenerator: Send + Sync {
  fn generate(&self, description: &str, detected_domains: &[String]) -> Result<Vec<CandidateTest>, String>;
}

/// Revision source used when the working directory cannot serve an event.
pub trait FallbackSource: Send + Sync {
  /// `Ok(None)` when this source has nothing for the event.
  fn patch_set(&self, event: &ChangeEvent) -> Result<Option<PatchSet>, EngineError>;
}

/// Serves the unified diff and file contents carried on the event itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventPatchFallback;

impl FallbackSource for EventPatchFallback {
  fn patch_set(&self, event: &ChangeEvent) -> Result<Option<PatchSet>, EngineError> {
    let Some(patch) = event.patch.as_deref().filter(|p| !p.trim().is_empty()) else {
      return Ok(None);
    };
    let set = PatchSet::parse(patch)
      .with_contents(event.files.clone())
      .with_revisions(event.before.as_str(), event.after.as_str());
    if set.is_empty() {
      return Err(EngineError::validation("patch", "no file sections"));
    }
    Ok(Some(set))
  }
}
