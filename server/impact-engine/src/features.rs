//! Flatten a classified change plus history into the risk feature vector.

use tracing::debug;

use crate::classify::{is_api_path, is_config_path, is_test_path, is_ui_path};
use crate::types::*;

/// Ordered keyword groups; the first group with a hit wins.
const FUNCTION_GROUPS: &[(FunctionCategory, &[&str])] = &[
  (
    FunctionCategory::Payment,
    &[
      "payment", "billing", "invoice", "wallet", "transaction", "checkout", "refund",
      "subscription", "payout",
    ],
  ),
  (
    FunctionCategory::Auth,
    &["auth", "login", "session", "token", "oauth", "security", "credential", "password"],
  ),
  (FunctionCategory::Admin, &["admin", "console", "permission", "rbac", "role"]),
  (FunctionCategory::Search, &["search", "query", "filter", "index"]),
  (FunctionCategory::Profile, &["profile", "user", "account", "settings"]),
  (
    FunctionCategory::Analytics,
    &["analytics", "metrics", "tracking", "report", "dashboard"],
  ),
];

const SHARED_MARKERS: &[&str] = &["shared", "common", "utils"];

const MICROSERVICE_MARKERS: &[&str] = &["service/", "/services/", "microservice", "lambda", "function/"];

const MAX_DEPENDENCY_DEPTH: u32 = 5;

fn lowered_text(classified: &ClassifiedChange) -> String {
  let mut parts: Vec<&str> = classified.changed_files.iter().map(|f| f.path.as_str()).collect();
  parts.extend(classified.affected_components.iter().map(|c| c.as_str()));
  parts.join(" ").to_lowercase()
}

pub fn infer_function_category(text: &str) -> FunctionCategory {
  FUNCTION_GROUPS
    .iter()
    .find(|(_, words)| words.iter().any(|w| text.contains(w)))
    .map(|(cat, _)| *cat)
    .unwrap_or_default()
}

pub fn infer_module_name(components: &[String]) -> ModuleName {
  components
    .iter()
    .find_map(|c| ModuleName::lookup(c))
    .unwrap_or_default()
}

pub fn infer_change_kind(classified: &ClassifiedChange) -> ChangeKind {
  let cats = &classified.change_types;
  let paths = || classified.changed_files.iter().map(|f| f.path.as_str());
  if cats.contains(&ChangeCategory::Api) {
    ChangeKind::ApiChange
  } else if cats.contains(&ChangeCategory::Ui) || paths().any(is_ui_path) {
    ChangeKind::UiChange
  } else if cats.contains(&ChangeCategory::Config) || paths().any(is_config_path) {
    ChangeKind::ConfigChange
  } else {
    ChangeKind::ServiceLogicChange
  }
}

pub fn infer_component_type(classified: &ClassifiedChange) -> ComponentType {
  let api = classified.changed_files.iter().filter(|f| is_api_path(&f.path)).count();
  let ui = classified.changed_files.iter().filter(|f| is_ui_path(&f.path)).count();
  if api > ui {
    ComponentType::Api
  } else if ui > 0 {
    ComponentType::Ui
  } else {
    ComponentType::Service
  }
}

/// High when tests make up more than 30% of the change; low when a sizeable
/// change (more than 3 files or more than 500 lines) carries no tests.
pub fn estimate_coverage(files_changed: u32, test_files: u32, lines_changed: u32) -> CoverageLevel {
  if files_changed > 0 && test_files as f64 / files_changed as f64 > 0.3 {
    CoverageLevel::High
  } else if test_files == 0 && (files_changed > 3 || lines_changed > 500) {
    CoverageLevel::Low
  } else {
    CoverageLevel::Medium
  }
}

pub fn infer_repo_type(classified: &ClassifiedChange, repo: &RepoContext) -> RepoType {
  let text = lowered_text(classified);
  let repo_name = repo.repo_name.to_lowercase();
  if MICROSERVICE_MARKERS
    .iter()
    .any(|m| text.contains(m) || repo_name.contains(m))
  {
    RepoType::Microservices
  } else {
    RepoType::Monolith
  }
}

/// Counts of API and UI files, for display.
pub fn impact_surface(classified: &ClassifiedChange) -> ImpactSurface {
  let count = |cat: ChangeCategory| {
    classified
      .changed_files
      .iter()
      .filter(|f| f.change_types.contains(&cat))
      .count() as u32
  };
  ImpactSurface {
    apis_impacted: count(ChangeCategory::Api),
    ui_components_impacted: count(ChangeCategory::Ui),
  }
}

pub fn extract_features(
  classified: &ClassifiedChange,
  repo: &RepoContext,
  history: &HistoricalContext,
) -> RiskFeatureVector {
  let files = &classified.changed_files;
  let lines_changed: u32 = files
    .iter()
    .map(|f| {
      let (a, d) = f.line_counts();
      a + d
    })
    .sum();
  let files_changed = files.len() as u32;
  let components = &classified.affected_components;

  let dependency_depth = if components.is_empty() {
    1
  } else {
    (components.len() as u32).min(MAX_DEPENDENCY_DEPTH)
  };

  let text = lowered_text(classified);
  let shared = SHARED_MARKERS.iter().any(|m| text.contains(m));

  let test_files = files.iter().filter(|f| is_test_path(&f.path)).count() as u32;

  let features = RiskFeatureVector {
    lines_changed,
    files_changed,
    dependency_depth,
    shared_component: u8::from(shared),
    historical_failure_count: history.failure_count,
    historical_change_frequency: history.change_frequency,
    days_since_last_failure: history.days_since_last_failure,
    tests_impacted: history.tests_impacted.unwrap_or(test_files),
    repo_type: infer_repo_type(classified, repo),
    module_name: infer_module_name(components),
    change_type: infer_change_kind(classified),
    component_type: infer_component_type(classified),
    function_category: infer_function_category(&text),
    test_coverage_level: estimate_coverage(files_changed, test_files, lines_changed),
  };
  debug!(
    lines = features.lines_changed,
    files = features.files_changed,
    category = features.function_category.as_str(),
    "extracted features"
  );
  features
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;

  fn file(path: &str, added: u32, cats: &[ChangeCategory]) -> ChangedFile {
    let mut f = ChangedFile::from_entry(&FileStatusEntry::new(path, FileStatus::Modified));
    f.additions = Some(added);
    f.deletions = Some(0);
    f.change_types = cats.iter().copied().collect();
    f
  }

  fn classified(files: Vec<ChangedFile>, components: &[&str]) -> ClassifiedChange {
    let change_types: BTreeSet<ChangeCategory> =
      files.iter().flat_map(|f| f.change_types.iter().copied()).collect();
    ClassifiedChange {
      before: "a".to_string(),
      after: "b".to_string(),
      changed_files: files,
      changed_functions: Vec::new(),
      change_types,
      affected_components: components.iter().map(|s| s.to_string()).collect(),
      summary: AnalysisSummary::default(),
    }
  }

  #[test]
  fn payment_terms_take_precedence() {
    assert_eq!(infer_function_category("auth/billing_token.py"), FunctionCategory::Payment);
    assert_eq!(infer_function_category("api/login.py"), FunctionCategory::Auth);
    assert_eq!(infer_function_category("admin/search.py"), FunctionCategory::Admin);
    assert_eq!(infer_function_category("docs/intro.py"), FunctionCategory::Misc);
  }

  #[test]
  fn coverage_levels() {
    assert_eq!(estimate_coverage(10, 4, 100), CoverageLevel::High);
    assert_eq!(estimate_coverage(5, 0, 40), CoverageLevel::Low);
    assert_eq!(estimate_coverage(2, 0, 600), CoverageLevel::Low);
    assert_eq!(estimate_coverage(2, 0, 80), CoverageLevel::Medium);
    assert_eq!(estimate_coverage(10, 2, 80), CoverageLevel::Medium);
  }

  #[test]
  fn large_untested_change_is_low_coverage_even_with_few_files() {
    assert_eq!(estimate_coverage(2, 0, 600), CoverageLevel::Low);
    assert_eq!(estimate_coverage(2, 0, 500), CoverageLevel::Medium);
    assert_eq!(estimate_coverage(3, 0, 501), CoverageLevel::Low);
    assert_eq!(estimate_coverage(2, 1, 600), CoverageLevel::High);
  }

  #[test]
  fn shared_billing_change_extracts_expected_features() {
    let c = classified(
      vec![
        file("shared/utils.py", 300, &[ChangeCategory::Service]),
        file("billing/gateway.py", 300, &[ChangeCategory::Service]),
      ],
      &["billing", "shared"],
    );
    let f = extract_features(&c, &RepoContext::default(), &HistoricalContext::default());
    assert_eq!(f.lines_changed, 600);
    assert_eq!(f.files_changed, 2);
    assert_eq!(f.dependency_depth, 2);
    assert!(f.is_shared());
    assert_eq!(f.function_category, FunctionCategory::Payment);
    assert_eq!(f.test_coverage_level, CoverageLevel::Low);
    assert_eq!(f.change_type, ChangeKind::ServiceLogicChange);
    assert_eq!(f.module_name.as_str(), "CoreModule");
    assert_eq!(f.historical_change_frequency, 1);
    assert_eq!(f.days_since_last_failure, 30);
  }

  #[test]
  fn api_category_wins_change_kind_and_component_type() {
    let c = classified(
      vec![
        file("api/login.py", 40, &[ChangeCategory::Api]),
        file("web/components/Login.jsx", 10, &[ChangeCategory::Ui]),
        file("server/api/session.py", 5, &[ChangeCategory::Api]),
      ],
      &["LoginHandler", "web"],
    );
    let f = extract_features(&c, &RepoContext::default(), &HistoricalContext::default());
    assert_eq!(f.change_type, ChangeKind::ApiChange);
    assert_eq!(f.component_type, ComponentType::Api);
    assert_eq!(f.module_name.as_str(), "LoginHandler");
    assert_eq!(f.function_category, FunctionCategory::Auth);
    assert_eq!(impact_surface(&c), ImpactSurface { apis_impacted: 2, ui_components_impacted: 1 });
  }

  #[test]
  fn depth_is_capped_and_history_passes_through() {
    let c = classified(
      vec![file("svc/a.py", 1, &[ChangeCategory::Service])],
      &["a", "b", "c", "d", "e", "f", "g"],
    );
    let history = HistoricalContext {
      failure_count: 4,
      change_frequency: 12,
      days_since_last_failure: 3,
      tests_impacted: Some(9),
    };
    let f = extract_features(&c, &RepoContext::default(), &history);
    assert_eq!(f.dependency_depth, 5);
    assert_eq!(f.historical_failure_count, 4);
    assert_eq!(f.historical_change_frequency, 12);
    assert_eq!(f.days_since_last_failure, 3);
    assert_eq!(f.tests_impacted, 9);
  }
}
