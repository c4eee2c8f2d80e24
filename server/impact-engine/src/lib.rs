//! Change Impact Engine: revision diff → structural nodes → classification →
//! features → risk assessment → test prioritization. No DB, no network.
//! Used by the binary for stdin/stdout and by impact-pipeline as a library.

pub mod classify;
pub mod config;
pub mod diff;
pub mod error;
pub mod features;
pub mod handoff;
pub mod keywords;
pub mod model;
pub mod prioritize;
pub mod score;
pub mod source;
pub mod structure;
pub mod types;

use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use config::{Config, RuleVariant};
pub use diff::{DiffParser, RevisionSource};
pub use error::EngineError;
pub use keywords::KeywordScan;
pub use model::{LinearRiskModel, ModelRow, RiskClassifier};
pub use prioritize::TestPrioritizer;
pub use score::RiskScorer;
pub use source::PatchSet;
pub use structure::StructureAnalyzer;
pub use types::*;

/// Diff, structure and classification for one revision pair.
///
/// Python files that fail to parse keep their path category; every other
/// collaborator error is returned.
pub fn analyze(
  source: &dyn RevisionSource,
  before: &str,
  after: &str,
  config: &Config,
) -> Result<ClassifiedChange, EngineError> {
  let files = DiffParser::new(config).parse_diff(source, before, after)?;
  classify_files(source, before, after, files, config)
}

/// `analyze` over a name-status listing obtained earlier from the same source.
pub fn analyze_listed(
  source: &dyn RevisionSource,
  before: &str,
  after: &str,
  listing: Vec<FileStatusEntry>,
  config: &Config,
) -> Result<ClassifiedChange, EngineError> {
  let files = DiffParser::new(config).parse_listed(source, before, after, listing)?;
  classify_files(source, before, after, files, config)
}

fn classify_files(
  source: &dyn RevisionSource,
  before: &str,
  after: &str,
  files: Vec<ChangedFile>,
  config: &Config,
) -> Result<ClassifiedChange, EngineError> {
  let analyzer = StructureAnalyzer::new(config);

  let mut nodes_by_file = BTreeMap::new();
  for file in &files {
    if file.status == FileStatus::Deleted || !structure::is_supported(&file.path) {
      continue;
    }
    let Some(content) = source.file_content(after, &file.path)? else {
      debug!(path = %file.path, "no after-revision content");
      continue;
    };
    match analyzer.extract_nodes(&file.path, &content) {
      Ok(nodes) => {
        nodes_by_file.insert(file.path.clone(), nodes);
      }
      Err(e @ EngineError::Syntax { .. }) => {
        warn!(error = %e, "skipping structural analysis");
      }
      Err(e) => return Err(e),
    }
  }

  Ok(classify::classify(before, after, files, &nodes_by_file))
}

/// Everything derived from a classified change before prioritization.
#[derive(Debug, Clone)]
pub struct Assessed {
  pub features: RiskFeatureVector,
  pub surface: ImpactSurface,
  pub structural_risk_score: f64,
  pub keywords: KeywordScan,
  pub assessment: RiskAssessment,
}

/// Features, keyword scan and the pre-computed combined score.
pub fn assess(
  classified: &ClassifiedChange,
  repo: &RepoContext,
  history: &HistoricalContext,
  config: &Config,
) -> Assessed {
  let features = features::extract_features(classified, repo, history);
  let surface = features::impact_surface(classified);
  let structural_risk_score = score::structural_score(classified);
  let keywords = keywords::scan(&keywords::scan_text(classified));
  let combined = score::combined_score(structural_risk_score, &keywords);
  let assessment = RiskScorer::new(config, None).score(&features, &keywords, Some(combined));

  Assessed {
    features,
    surface,
    structural_risk_score,
    keywords,
    assessment,
  }
}

/// Rank candidate tests for an assessed change; High risk marks the module critical.
pub fn prioritize(
  assessed: &Assessed,
  candidates: &[CandidateTest],
  config: &Config,
) -> Prioritization {
  TestPrioritizer::new(config.importance_threshold).prioritize(
    candidates,
    assessed.assessment.risk_score,
    assessed.features.files_changed,
    assessed.assessment.risk_level == RiskLevel::High,
  )
}

/// Run the engine on parsed input and return the output (no I/O).
pub fn run(input: &Input, config: &Config) -> Result<Output, EngineError> {
  let source = PatchSet::parse(&input.diff)
    .with_contents(input.files.clone())
    .with_revisions(input.before.as_str(), input.after.as_str());
  let analysis = analyze(&source, &input.before, &input.after, config)?;
  let assessed = assess(&analysis, &input.repo, &input.history, config);
  let prioritization = prioritize(&assessed, &input.candidate_tests, config);

  Ok(Output {
    analysis,
    features: assessed.features,
    surface: assessed.surface,
    structural_risk_score: assessed.structural_risk_score,
    assessment: assessed.assessment,
    prioritization,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn run_returns_valid_output_shape() {
    let input = Input {
      before: "a1".to_string(),
      after: "b2".to_string(),
      diff: "diff --git a/app/config.yaml b/app/config.yaml\n--- a/app/config.yaml\n+++ b/app/config.yaml\n@@ -1 +1 @@\n-debug: true\n+debug: false\n".to_string(),
      files: BTreeMap::new(),
      repo: RepoContext::default(),
      history: HistoricalContext::default(),
      candidate_tests: Vec::new(),
    };
    let out = run(&input, &Config::default()).unwrap();
    assert_eq!(out.analysis.changed_files.len(), 1);
    assert!(out.analysis.change_types.contains(&ChangeCategory::Config));
    assert!(out.assessment.risk_score <= score::MAX_RISK);
    assert_eq!(out.assessment.method, ScoreMethod::Precomputed);
    assert!(out.prioritization.all_tests.is_empty());
  }

  #[test]
  fn analyze_listed_uses_the_given_listing() {
    let diff = "\
diff --git a/app/a.py b/app/a.py
--- a/app/a.py
+++ b/app/a.py
@@ -1 +1 @@
-x = 1
+x = 2
diff --git a/app/b.py b/app/b.py
--- a/app/b.py
+++ b/app/b.py
@@ -1 +1 @@
-y = 1
+y = 2
";
    let source = PatchSet::parse(diff).with_revisions("a1", "b2");
    let config = Config::default();
    let full = analyze(&source, "a1", "b2", &config).unwrap();
    assert_eq!(full.changed_files.len(), 2);

    let listing = vec![FileStatusEntry::new("app/b.py", FileStatus::Modified)];
    let listed = analyze_listed(&source, "a1", "b2", listing, &config).unwrap();
    assert_eq!(listed.changed_files.len(), 1);
    assert_eq!(listed.changed_files[0].path, "app/b.py");
    let b = full.changed_files.iter().find(|f| f.path == "app/b.py").unwrap();
    assert_eq!(listed.changed_files[0].line_ranges, b.line_ranges);
  }

  #[test]
  fn empty_revision_is_rejected() {
    let input = Input {
      before: String::new(),
      after: "b2".to_string(),
      diff: String::new(),
      files: BTreeMap::new(),
      repo: RepoContext::default(),
      history: HistoricalContext::default(),
      candidate_tests: Vec::new(),
    };
    assert!(matches!(
      run(&input, &Config::default()),
      Err(EngineError::Validation { .. })
    ));
  }
}
