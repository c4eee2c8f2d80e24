//! Risk scoring: pre-computed, classifier, or rule-based, plus keyword boost.

use tracing::{debug, warn};

use crate::config::{Config, RuleVariant};
use crate::keywords::KeywordScan;
use crate::model::{ModelRow, RiskClassifier};
use crate::types::*;

/// Upper bound for every risk score.
pub const MAX_RISK: f64 = 0.95;
/// Upper bound for the structural score.
pub const MAX_STRUCTURAL: f64 = 0.50;
const MAX_FACTORS: usize = 5;

pub(crate) fn round4(x: f64) -> f64 {
  (x * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Structural score (pipeline's pre-computed path)
// ---------------------------------------------------------------------------

/// Magnitude of the change from the classified diff alone, capped at 0.50.
pub fn structural_score(classified: &ClassifiedChange) -> f64 {
  let files = &classified.changed_files;
  let lines: u32 = files
    .iter()
    .map(|f| {
      let (a, d) = f.line_counts();
      a + d
    })
    .sum();
  let nodes: usize = files.iter().map(|f| f.changed_nodes.len()).sum();

  let mut score = match lines {
    l if l > 500 => 0.15,
    l if l > 200 => 0.12,
    l if l > 100 => 0.08,
    l if l > 50 => 0.05,
    _ => 0.02,
  };
  score += match files.len() {
    n if n > 20 => 0.10,
    n if n > 10 => 0.08,
    n if n > 5 => 0.05,
    _ => 0.02,
  };
  score += match nodes {
    n if n > 15 => 0.10,
    n if n > 8 => 0.07,
    n if n > 3 => 0.04,
    _ => 0.01,
  };
  if classified.change_types.contains(&ChangeCategory::Api) {
    score += 0.08;
  }
  if files.iter().flat_map(|f| f.changed_nodes.iter()).any(|n| n.is_async) {
    score += 0.05;
  }
  f64::min(score, MAX_STRUCTURAL)
}

/// Structural score merged with the keyword boost, ready to hand to the scorer.
pub fn combined_score(structural: f64, keywords: &KeywordScan) -> f64 {
  f64::min(structural + keywords.total_boost, MAX_RISK)
}

// ---------------------------------------------------------------------------
// Rule-based fallback
// ---------------------------------------------------------------------------

/// Constants for one rule variant.
struct RuleTable {
  lines: [f64; 5],
  domain: [f64; 6],
  api_change: f64,
}

const FEATURE_PATH: RuleTable = RuleTable {
  lines: [0.12, 0.10, 0.07, 0.05, 0.02],
  domain: [0.30, 0.25, 0.20, 0.15, 0.10, 0.03],
  api_change: 0.10,
};

const IMPACT_ENDPOINT: RuleTable = RuleTable {
  lines: [0.15, 0.12, 0.08, 0.05, 0.02],
  domain: [0.25, 0.18, 0.12, 0.15, 0.10, 0.03],
  api_change: 0.12,
};

impl RuleVariant {
  fn table(self) -> &'static RuleTable {
    match self {
      Self::FeaturePath => &FEATURE_PATH,
      Self::ImpactEndpoint => &IMPACT_ENDPOINT,
    }
  }
}

/// Rule-based risk for one variant. The two variants are never blended.
pub fn rule_based_score(f: &RiskFeatureVector, variant: RuleVariant) -> f64 {
  let t = variant.table();
  let mut risk = match f.lines_changed {
    l if l > 500 => t.lines[0],
    l if l > 200 => t.lines[1],
    l if l > 100 => t.lines[2],
    l if l > 50 => t.lines[3],
    _ => t.lines[4],
  };
  risk += match f.files_changed {
    n if n > 20 => 0.10,
    n if n > 10 => 0.08,
    n if n > 5 => 0.05,
    _ => 0.02,
  };
  risk += f64::min(f.dependency_depth as f64 * 0.02, 0.08);
  if f.is_shared() {
    risk += 0.05;
  }

  risk += match f.function_category {
    FunctionCategory::Payment => t.domain[0],
    FunctionCategory::Auth => t.domain[1],
    FunctionCategory::Admin => t.domain[2],
    FunctionCategory::Profile => t.domain[3],
    FunctionCategory::Search | FunctionCategory::Analytics => t.domain[4],
    FunctionCategory::Misc => t.domain[5],
  };
  risk += match f.change_type {
    ChangeKind::ApiChange => t.api_change,
    ChangeKind::ServiceLogicChange => 0.07,
    ChangeKind::UiChange => 0.04,
    ChangeKind::ConfigChange => 0.02,
  };

  risk += f64::min(f.historical_failure_count as f64 * 0.02, 0.10);
  risk += match f.test_coverage_level {
    CoverageLevel::Low => 0.10,
    CoverageLevel::Medium => 0.04,
    CoverageLevel::High => 0.0,
  };
  f64::min(risk, MAX_RISK)
}

// ---------------------------------------------------------------------------
// Explanations
// ---------------------------------------------------------------------------

/// Conditions read off the feature vector, in display order.
pub fn structural_factors(f: &RiskFeatureVector) -> Vec<String> {
  let mut out = Vec::new();
  if f.is_shared() {
    out.push("Shared component modified".to_string());
  }
  if f.historical_failure_count > 5 {
    out.push("High historical failure rate".to_string());
  } else if f.historical_failure_count > 2 {
    out.push("Moderate historical failure rate".to_string());
  }
  if f.dependency_depth > 3 {
    out.push(format!("Deep dependency chain (depth: {})", f.dependency_depth));
  }
  if f.lines_changed > 500 {
    out.push("Large code change volume".to_string());
  } else if f.lines_changed > 100 {
    out.push("Moderate code change volume".to_string());
  }
  if f.files_changed > 10 {
    out.push("Many files affected".to_string());
  }
  if f.test_coverage_level == CoverageLevel::Low {
    out.push("Low test coverage area".to_string());
  }
  if f.change_type == ChangeKind::ApiChange {
    out.push("API contract modification".to_string());
  }
  if f.function_category.is_critical() {
    out.push(format!("Critical function area ({})", f.function_category.as_str()));
  }
  if f.days_since_last_failure < 7 {
    out.push("Recent failures in this area".to_string());
  }
  if f.historical_change_frequency > 10 {
    out.push("High change frequency area".to_string());
  }
  out.truncate(MAX_FACTORS);
  out
}

/// Keyword factors first, then structural ones; unique, at most five.
pub fn impact_factors(f: &RiskFeatureVector, keywords: &KeywordScan) -> Vec<String> {
  let structural = structural_factors(f);
  if keywords.risk_factors.is_empty() && structural.is_empty() {
    return vec!["Standard code modification".to_string()];
  }
  let mut out: Vec<String> = Vec::new();
  for factor in keywords.risk_factors.iter().chain(structural.iter()) {
    if !out.contains(factor) {
      out.push(factor.clone());
    }
  }
  out.truncate(MAX_FACTORS);
  out
}

pub fn recommended_action(level: RiskLevel, change: ChangeKind) -> String {
  let mut action = match level {
    RiskLevel::High => "Run full regression tests",
    RiskLevel::Medium => "Run targeted tests + integration tests",
    RiskLevel::Low => "Run targeted tests only",
  }
  .to_string();
  match change {
    ChangeKind::ApiChange => action.push_str(" + API contract tests"),
    ChangeKind::UiChange => action.push_str(" + UI regression tests"),
    _ => {}
  }
  action
}

pub fn action_justification(level: RiskLevel, score: f64) -> String {
  match level {
    RiskLevel::High => format!(
      "High risk score ({:.2}) detected due to changes in critical areas. Full regression recommended to ensure system stability.",
      score
    ),
    RiskLevel::Medium => format!(
      "Moderate risk ({:.2}) suggests running tests for affected modules and their integrations.",
      score
    ),
    RiskLevel::Low => format!(
      "Low risk ({:.2}) indicates isolated changes. Standard unit and targeted tests should suffice.",
      score
    ),
  }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct RiskScorer<'a> {
  config: &'a Config,
  classifier: Option<&'a dyn RiskClassifier>,
}

impl<'a> RiskScorer<'a> {
  pub fn new(config: &'a Config, classifier: Option<&'a dyn RiskClassifier>) -> Self {
    Self { config, classifier }
  }

  fn classify(&self, f: &RiskFeatureVector) -> Option<f64> {
    let classifier = self.classifier?;
    match classifier.predict_probability(&ModelRow::from_features(f)) {
      Ok(p) if (0.0..=1.0).contains(&p) => Some(p),
      Ok(p) => {
        warn!(probability = p, "classifier returned out-of-range value, using rule-based fallback");
        None
      }
      Err(e) => {
        warn!(error = %e, "classifier failed, using rule-based fallback");
        None
      }
    }
  }

  /// Base score from the first applicable method, then level, action and factors.
  pub fn score(
    &self,
    features: &RiskFeatureVector,
    keywords: &KeywordScan,
    precomputed: Option<f64>,
  ) -> RiskAssessment {
    let (raw, method) = match precomputed {
      Some(p) => (p.clamp(0.0, MAX_RISK), ScoreMethod::Precomputed),
      None => match self.classify(features) {
        Some(p) => (f64::min(p + keywords.total_boost, MAX_RISK), ScoreMethod::Classifier),
        None => {
          let base = rule_based_score(features, self.config.rule_variant);
          (f64::min(base + keywords.total_boost, MAX_RISK), ScoreMethod::RuleBased)
        }
      },
    };

    let risk_score = round4(raw);
    let risk_level = RiskLevel::from_score(risk_score);
    debug!(risk_score, ?risk_level, ?method, boost = keywords.total_boost, "scored change");

    RiskAssessment {
      risk_score,
      risk_level,
      risk_color: risk_level.color().to_string(),
      recommended_action: recommended_action(risk_level, features.change_type),
      action_justification: action_justification(risk_level, risk_score),
      top_impact_factors: impact_factors(features, keywords),
      detected_risk_domains: keywords.detected_domains.clone(),
      keyword_risk_boost: round4(keywords.total_boost),
      method,
    }
  }
}
