//! Hand-off to the test-generation collaborator: change description and
//! domain-derived fallback candidates.

use serde_json::json;

use crate::types::*;

const MAX_DESCRIBED_FILES: usize = 5;
const MAX_DESCRIBED_NODES: usize = 5;

fn status_str(status: FileStatus) -> &'static str {
  match status {
    FileStatus::Added => "added",
    FileStatus::Modified => "modified",
    FileStatus::Deleted => "deleted",
    FileStatus::Renamed => "renamed",
  }
}

fn kind_str(kind: NodeKind) -> &'static str {
  match kind {
    NodeKind::Function => "function",
    NodeKind::AsyncFunction => "async_function",
    NodeKind::Class => "class",
    NodeKind::Import => "import",
  }
}

/// Natural-language summary of the change for the test generator.
pub fn describe_change(assessment: &RiskAssessment, classified: &ClassifiedChange) -> String {
  let mut out = String::new();
  if assessment.detected_risk_domains.is_empty() {
    out.push_str("Code changes detected.\n");
  } else {
    out.push_str("Security-sensitive code changes detected.\n");
  }
  out.push_str(&format!(
    "Risk Level: {:?} ({:.2})\n",
    assessment.risk_level, assessment.risk_score
  ));
  let domains = if assessment.detected_risk_domains.is_empty() {
    "none".to_string()
  } else {
    assessment.detected_risk_domains.join(", ")
  };
  out.push_str(&format!("Risk Domains: {}\n\n", domains));
  out.push_str("Files changed:\n");

  for file in classified.changed_files.iter().take(MAX_DESCRIBED_FILES) {
    out.push_str(&format!("\nFile: {}\n", file.path));
    out.push_str(&format!("Status: {}\n", status_str(file.status)));
    if file.changed_nodes.is_empty() {
      continue;
    }
    out.push_str("Functions/Methods:\n");
    for node in file.changed_nodes.iter().take(MAX_DESCRIBED_NODES) {
      let name = match &node.parent {
        Some(parent) => format!("{}.{}", parent, node.name),
        None => node.name.clone(),
      };
      out.push_str(&format!("  - {}: {}\n", kind_str(node.kind), name));
    }
  }
  out
}

/// Candidate tests derived from detected domains, used when the generator
/// is unavailable or returns nothing.
pub fn fallback_candidates(detected_domains: &[String]) -> Vec<CandidateTest> {
  let mut out = Vec::new();
  for domain in detected_domains {
    match domain.as_str() {
      "security" => out.push(CandidateTest {
        name: "test_auth_required".to_string(),
        endpoint: "/api/endpoint".to_string(),
        method: "POST".to_string(),
        expected_status: 401,
        description: "Verify authentication is required".to_string(),
        ..CandidateTest::default()
      }),
      "financial" => out.push(CandidateTest {
        name: "test_payment_validation".to_string(),
        endpoint: "/api/payment".to_string(),
        method: "POST".to_string(),
        payload: json!({ "amount": -100 }),
        expected_status: 400,
        description: "Verify negative amounts are rejected".to_string(),
        ..CandidateTest::default()
      }),
      "permission" => out.push(CandidateTest {
        name: "test_unauthorized_access".to_string(),
        endpoint: "/api/admin".to_string(),
        method: "GET".to_string(),
        expected_status: 403,
        description: "Verify proper authorization checks".to_string(),
        ..CandidateTest::default()
      }),
      _ => {}
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fallback_follows_domain_order() {
    let domains = vec![
      "financial".to_string(),
      "state_mutation".to_string(),
      "security".to_string(),
      "permission".to_string(),
    ];
    let tests = fallback_candidates(&domains);
    let names: Vec<&str> = tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
      names,
      vec!["test_payment_validation", "test_auth_required", "test_unauthorized_access"]
    );
    assert_eq!(tests[0].payload["amount"], -100);
    assert_eq!(tests[2].expected_status, 403);
    assert_eq!(tests[1].category, "functional");
  }

  #[test]
  fn description_lists_files_and_nodes() {
    let mut f = ChangedFile::from_entry(&FileStatusEntry::new("api/login.py", FileStatus::Added));
    f.changed_nodes = vec![StructuralNode {
      name: "login".to_string(),
      kind: NodeKind::Function,
      start_line: 1,
      end_line: 40,
      parent: None,
      decorators: vec!["app.post".to_string()],
      docstring: None,
      is_async: false,
      parameters: Vec::new(),
    }];
    let classified = ClassifiedChange {
      before: "a".to_string(),
      after: "b".to_string(),
      changed_files: vec![f],
      changed_functions: Vec::new(),
      change_types: Default::default(),
      affected_components: Vec::new(),
      summary: AnalysisSummary::default(),
    };
    let assessment = RiskAssessment {
      risk_score: 0.8123,
      risk_level: RiskLevel::High,
      risk_color: "red".to_string(),
      recommended_action: String::new(),
      action_justification: String::new(),
      top_impact_factors: Vec::new(),
      detected_risk_domains: vec!["security".to_string()],
      keyword_risk_boost: 0.25,
      method: ScoreMethod::Precomputed,
    };
    let text = describe_change(&assessment, &classified);
    assert!(text.starts_with("Security-sensitive code changes detected.\nRisk Level: High (0.81)\n"));
    assert!(text.contains("Risk Domains: security\n"));
    assert!(text.contains("File: api/login.py\nStatus: added\nFunctions/Methods:\n  - function: login\n"));
  }
}
