//! Engine configuration with sane defaults.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Which rule-based formula the scorer falls back to.
///
/// Two formulas are maintained side by side with different constants for the
/// same signals; they are never blended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleVariant {
  /// Feeds the classifier path; the engine default.
  #[default]
  FeaturePath,
  /// Used by the raw impact-analysis endpoint.
  ImpactEndpoint,
}

impl RuleVariant {
  pub fn parse(raw: &str) -> Result<Self, EngineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "feature_path" | "feature-path" => Ok(Self::FeaturePath),
      "impact_endpoint" | "impact-endpoint" => Ok(Self::ImpactEndpoint),
      other => Err(EngineError::validation(
        "rule_variant",
        &format!("unknown variant '{}'", other),
      )),
    }
  }
}

/// Tunable thresholds for analysis and prioritization.
#[derive(Debug, Clone)]
pub struct Config {
  /// Priority score a test must reach to count as important.
  pub importance_threshold: f64,
  /// Max characters kept from a docstring before the "..." marker.
  pub docstring_max_chars: usize,
  /// Context lines for the display diff (analysis always uses zero).
  pub display_context_lines: u32,
  /// Rule-based fallback formula.
  pub rule_variant: RuleVariant,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      importance_threshold: 0.65,
      docstring_max_chars: 200,
      display_context_lines: 3,
      rule_variant: RuleVariant::FeaturePath,
    }
  }
}
