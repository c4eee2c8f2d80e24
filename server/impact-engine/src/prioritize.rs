//! Test prioritization: score candidate tests against the change's risk.

use tracing::debug;

use crate::score::round4;
use crate::types::*;

fn category_score(category: &str) -> f64 {
  match category.to_ascii_lowercase().as_str() {
    "authentication" => 0.30,
    "security" => 0.28,
    "payment" => 0.25,
    "error_handling" => 0.20,
    "crud" => 0.15,
    "edge_case" => 0.12,
    "happy_path" => 0.10,
    _ => 0.08,
  }
}

fn method_score(method: &str) -> f64 {
  match method.to_ascii_uppercase().as_str() {
    "POST" => 0.10,
    "PUT" | "DELETE" => 0.08,
    "PATCH" => 0.06,
    _ => 0.04,
  }
}

fn status_boost(status: u16) -> f64 {
  if status >= 400 {
    0.10
  } else if status >= 300 {
    0.03
  } else {
    0.0
  }
}

/// Priority in [0, 1]: (category + method + status + critical) x (0.5 + 0.5 x risk).
pub fn priority_score(test: &CandidateTest, risk_score: f64, critical_module: bool) -> f64 {
  let critical = if critical_module { 0.15 } else { 0.0 };
  let raw = category_score(&test.category)
    + method_score(&test.method)
    + status_boost(test.expected_status)
    + critical;
  let multiplier = 0.5 + 0.5 * risk_score.clamp(0.0, 1.0);
  round4(f64::min(raw * multiplier, 1.0))
}

pub struct TestPrioritizer {
  threshold: f64,
}

impl TestPrioritizer {
  pub fn new(threshold: f64) -> Self {
    Self { threshold }
  }

  pub fn prioritize(
    &self,
    tests: &[CandidateTest],
    risk_score: f64,
    files_changed: u32,
    critical_module: bool,
  ) -> Prioritization {
    let risk_context = RiskContext {
      change_risk_score: risk_score,
      files_changed,
      critical_module,
      threshold: self.threshold,
    };

    let mut scored: Vec<(f64, &CandidateTest)> = tests
      .iter()
      .map(|t| (priority_score(t, risk_score, critical_module), t))
      .collect();
    // Stable: equal scores keep input order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let all: Vec<PrioritizedTest> = scored
      .into_iter()
      .enumerate()
      .map(|(i, (score, t))| {
        let rank = i + 1;
        PrioritizedTest {
          name: if t.name.is_empty() { format!("test_{}", rank) } else { t.name.clone() },
          endpoint: t.endpoint.clone(),
          method: t.method.clone(),
          payload: t.payload.clone(),
          expected_status: t.expected_status,
          description: t.description.clone(),
          category: t.category.clone(),
          priority_score: score,
          is_important: score >= self.threshold,
          rank,
        }
      })
      .collect();

    let mut selected: Vec<PrioritizedTest> = all.iter().filter(|t| t.is_important).cloned().collect();
    let priority_level = if selected.is_empty() {
      PriorityLevel::All
    } else {
      PriorityLevel::Important
    };
    if selected.is_empty() && !all.is_empty() {
      let half = usize::max(1, all.len() / 2);
      selected = all[..half].to_vec();
    }
    debug!(
      total = all.len(),
      selected = selected.len(),
      level = ?priority_level,
      "prioritized tests"
    );

    Prioritization {
      total_count: all.len(),
      selected_count: selected.len(),
      selected_tests: selected,
      all_tests: all,
      priority_level,
      risk_context,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test(name: &str, category: &str, method: &str, status: u16) -> CandidateTest {
    CandidateTest {
      name: name.to_string(),
      category: category.to_string(),
      method: method.to_string(),
      expected_status: status,
      ..CandidateTest::default()
    }
  }

  #[test]
  fn exact_arithmetic_for_critical_auth_test() {
    let t = test("login_rejects_bad_token", "authentication", "POST", 401);
    // (0.30 + 0.10 + 0.10 + 0.15) * 0.95
    assert_eq!(priority_score(&t, 0.9, true), 0.6175);
  }

  #[test]
  fn below_threshold_falls_back_to_top_half() {
    let tests = vec![
      test("a", "happy_path", "GET", 200),
      test("b", "authentication", "POST", 401),
      test("c", "crud", "PUT", 200),
    ];
    let p = TestPrioritizer::new(0.65).prioritize(&tests, 0.9, 3, true);
    assert_eq!(p.priority_level, PriorityLevel::All);
    assert_eq!(p.total_count, 3);
    assert_eq!(p.selected_count, 1);
    assert_eq!(p.selected_tests[0].name, "b");
    let ranks: Vec<usize> = p.all_tests.iter().map(|t| t.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(p.all_tests.iter().all(|t| !t.is_important));
  }

  #[test]
  fn threshold_selects_important_tests() {
    let tests = vec![
      test("low", "functional", "GET", 200),
      test("high", "authentication", "POST", 401),
    ];
    let p = TestPrioritizer::new(0.6).prioritize(&tests, 1.0, 2, true);
    assert_eq!(p.priority_level, PriorityLevel::Important);
    assert_eq!(p.selected_tests.len(), 1);
    assert_eq!(p.selected_tests[0].name, "high");
    assert_eq!(p.selected_tests[0].priority_score, 0.65);
    assert_eq!(p.all_tests[1].name, "low");
  }

  #[test]
  fn equal_scores_keep_input_order_and_names_default() {
    let tests = vec![test("", "crud", "GET", 200), test("second", "crud", "GET", 200)];
    let p = TestPrioritizer::new(0.65).prioritize(&tests, 0.5, 1, false);
    assert_eq!(p.all_tests[0].name, "test_1");
    assert_eq!(p.all_tests[1].name, "second");
    assert_eq!(p.selected_count, 1);
  }

  #[test]
  fn empty_input_yields_empty_result() {
    let p = TestPrioritizer::new(0.65).prioritize(&[], 0.8, 4, false);
    assert!(p.all_tests.is_empty());
    assert!(p.selected_tests.is_empty());
    assert_eq!(p.priority_level, PriorityLevel::All);
    assert_eq!(p.risk_context.files_changed, 4);
  }

  #[test]
  fn score_is_capped_at_one() {
    let t = test("x", "authentication", "POST", 500);
    assert!(priority_score(&t, 1.0, true) <= 1.0);
  }
}
