//! Trained-classifier contract and a JSON-exported logistic model.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::types::RiskFeatureVector;

/// A probability function over the one-hot encoded feature row.
///
/// Constructed once at startup and shared by reference; absence is a normal state.
pub trait RiskClassifier: Send + Sync {
  fn predict_probability(&self, row: &ModelRow) -> Result<f64, String>;
}

/// Named numeric columns; any column not present reads as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRow {
  columns: BTreeMap<String, f64>,
}

impl ModelRow {
  /// Numeric fields by name plus one `<field>_<value>` column per categorical field.
  pub fn from_features(f: &RiskFeatureVector) -> Self {
    let mut columns = BTreeMap::new();
    let numeric = [
      ("lines_changed", f.lines_changed as f64),
      ("files_changed", f.files_changed as f64),
      ("dependency_depth", f.dependency_depth as f64),
      ("shared_component", f.shared_component as f64),
      ("historical_failure_count", f.historical_failure_count as f64),
      ("historical_change_frequency", f.historical_change_frequency as f64),
      ("days_since_last_failure", f.days_since_last_failure as f64),
      ("tests_impacted", f.tests_impacted as f64),
    ];
    for (name, value) in numeric {
      columns.insert(name.to_string(), value);
    }

    // Categorical values use their canonical serialized strings.
    let categorical = serde_json::to_value(f).ok();
    for field in [
      "repo_type",
      "module_name",
      "change_type",
      "component_type",
      "function_category",
      "test_coverage_level",
    ] {
      if let Some(value) = categorical.as_ref().and_then(|v| v[field].as_str()) {
        columns.insert(format!("{}_{}", field, value), 1.0);
      }
    }
    Self { columns }
  }

  pub fn get(&self, column: &str) -> f64 {
    self.columns.get(column).copied().unwrap_or(0.0)
  }

  /// Values in the order a model expects.
  pub fn ordered(&self, names: &[String]) -> Vec<f64> {
    names.iter().map(|n| self.get(n)).collect()
  }
}

/// Logistic regression exported as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearRiskModel {
  feature_names: Vec<String>,
  weights: Vec<f64>,
  intercept: f64,
  #[serde(default)]
  threshold: Option<f64>,
}

impl LinearRiskModel {
  pub fn from_json(raw: &str) -> Result<Self, EngineError> {
    let model: Self = serde_json::from_str(raw)?;
    if model.feature_names.len() != model.weights.len() {
      return Err(EngineError::validation(
        "weights",
        &format!(
          "{} weights for {} features",
          model.weights.len(),
          model.feature_names.len()
        ),
      ));
    }
    Ok(model)
  }

  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)
      .map_err(|e| EngineError::source(format!("read {}: {}", path.display(), e)))?;
    Self::from_json(&raw)
  }

  /// Load once at startup; any failure leaves the scorer on its fallback chain.
  pub fn load_optional(path: Option<&Path>) -> Option<Self> {
    let path = path?;
    match Self::load(path) {
      Ok(model) => {
        info!(path = %path.display(), features = model.feature_names.len(), "loaded risk model");
        Some(model)
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "risk model unavailable, using rule-based scoring");
        None
      }
    }
  }
}

impl RiskClassifier for LinearRiskModel {
  fn predict_probability(&self, row: &ModelRow) -> Result<f64, String> {
    let x = row.ordered(&self.feature_names);
    let z = self.intercept + x.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>();
    let p = 1.0 / (1.0 + (-z).exp());
    if !p.is_finite() {
      return Err(format!("non-finite probability from logit {}", z));
    }
    if let Some(t) = self.threshold {
      debug!(probability = p, above_threshold = p >= t, "model prediction");
    }
    Ok(p)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{ChangeKind, FunctionCategory};

  #[test]
  fn one_hot_columns_use_canonical_values() {
    let f = RiskFeatureVector {
      lines_changed: 120,
      change_type: ChangeKind::ApiChange,
      function_category: FunctionCategory::Payment,
      ..RiskFeatureVector::default()
    };
    let row = ModelRow::from_features(&f);
    assert_eq!(row.get("lines_changed"), 120.0);
    assert_eq!(row.get("change_type_API_CHANGE"), 1.0);
    assert_eq!(row.get("function_category_payment"), 1.0);
    assert_eq!(row.get("module_name_CoreModule"), 1.0);
    assert_eq!(row.get("change_type_UI_CHANGE"), 0.0);
    assert_eq!(row.get("nonexistent"), 0.0);
  }

  #[test]
  fn logistic_model_predicts_from_named_columns() {
    let model = LinearRiskModel::from_json(
      r#"{"feature_names": ["shared_component", "change_type_API_CHANGE"], "weights": [1.0, 2.0], "intercept": -3.0}"#,
    )
    .unwrap();
    let f = RiskFeatureVector {
      shared_component: 1,
      change_type: ChangeKind::ApiChange,
      ..RiskFeatureVector::default()
    };
    let p = model.predict_probability(&ModelRow::from_features(&f)).unwrap();
    assert!((p - 0.5).abs() < 1e-12);
  }

  #[test]
  fn mismatched_weights_are_rejected() {
    let err = LinearRiskModel::from_json(r#"{"feature_names": ["a"], "weights": [], "intercept": 0}"#);
    assert!(matches!(err, Err(EngineError::Validation { .. })));
  }

  #[test]
  fn missing_model_file_yields_none() {
    assert!(LinearRiskModel::load_optional(Some(Path::new("/nonexistent/model.json"))).is_none());
    assert!(LinearRiskModel::load_optional(None).is_none());
  }
}
