//! Event processing: working directory → analysis → assessment → prioritization.
//!
//! Each accepted event runs once on its own task. Git work happens on the
//! blocking pool under per-operation timeouts; a clone or diff that cannot
//! complete is retried once against the fallback revision source.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use impact_engine::{
  handoff, Assessed, CandidateTest, ClassifiedChange, EngineError, FileStatusEntry, HistoricalContext,
  KeywordScan, PatchSet, RepoContext, RiskAssessment, RiskClassifier, RiskFeatureVector, RiskLevel, RiskScorer,
};

use crate::collab::{FallbackSource, TestGenerator};
use crate::config::Config;
use crate::error::PipelineError;
use crate::git::{GitRevisionSource, WorkdirManager};
use crate::store::EventLog;
use crate::types::*;

const INITIAL_PUSH_NOTE: &str = "initial push or new branch; diff analysis skipped";

/// Await a blocking analysis task; an elapsed deadline is a `DiffTimeout`.
async fn bounded<T>(
  task: JoinHandle<Result<T, PipelineError>>,
  limit: Duration,
  operation: &str,
) -> Result<T, PipelineError> {
  match tokio::time::timeout(limit, task).await {
    Ok(joined) => joined?,
    Err(_) => Err(EngineError::diff_timeout(operation, limit.as_secs()).into()),
  }
}

pub struct Pipeline {
  config: Arc<Config>,
  engine_config: impact_engine::Config,
  workdirs: WorkdirManager,
  log: EventLog,
  classifier: Option<Arc<dyn RiskClassifier>>,
  generator: Option<Arc<dyn TestGenerator>>,
  fallback: Option<Arc<dyn FallbackSource>>,
}

impl Pipeline {
  pub fn new(config: Config) -> Self {
    let config = Arc::new(config);
    Self {
      engine_config: config.engine_config(),
      workdirs: WorkdirManager::new(Arc::clone(&config)),
      config,
      log: EventLog::new(),
      classifier: None,
      generator: None,
      fallback: None,
    }
  }

  pub fn with_classifier(mut self, classifier: Arc<dyn RiskClassifier>) -> Self {
    self.classifier = Some(classifier);
    self
  }

  pub fn with_generator(mut self, generator: Arc<dyn TestGenerator>) -> Self {
    self.generator = Some(generator);
    self
  }

  pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSource>) -> Self {
    self.fallback = Some(fallback);
    self
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn log(&self) -> &EventLog {
    &self.log
  }

  /// Register the event and start processing it in the background.
  /// A known delivery id is reported as a duplicate and not processed again.
  pub async fn submit(self: &Arc<Self>, event: ChangeEvent) -> Result<SubmitOutcome, PipelineError> {
    for (field, value) in [
      ("delivery_id", &event.delivery_id),
      ("repository", &event.repository),
      ("after", &event.after),
    ] {
      if value.trim().is_empty() {
        return Err(PipelineError::validation(field, "must not be empty"));
      }
    }

    let outcome = self.log.submit(&event).await;
    if let SubmitOutcome::Accepted(record) = &outcome {
      info!(
        delivery_id = %record.delivery_id,
        analysis_id = %record.analysis_id,
        repo = %record.repository,
        "event accepted"
      );
      let this = Arc::clone(self);
      tokio::spawn(async move { this.process(event).await });
    }
    Ok(outcome)
  }

  /// Run one event to a terminal state. Failures are recorded, never retried.
  pub async fn process(&self, event: ChangeEvent) {
    let id = event.delivery_id.as_str();
    self.log.mark_processing(id).await;

    if event.is_initial_push() {
      info!(delivery_id = id, "skipping diff analysis for initial push");
      self.log.complete(id, None, Some(INITIAL_PUSH_NOTE.to_string())).await;
      return;
    }

    match self.analyze_event(&event).await {
      Ok(report) => {
        info!(
          delivery_id = id,
          risk_score = report.assessment.risk_score,
          level = ?report.assessment.risk_level,
          origin = ?report.origin,
          "event completed"
        );
        self.log.complete(id, Some(report), None).await;
      }
      Err(e) => {
        warn!(delivery_id = id, error = %e, "event failed");
        self.log.fail(id, e.to_string()).await;
      }
    }
  }

  async fn analyze_event(&self, event: &ChangeEvent) -> Result<AnalysisReport, PipelineError> {
    let (analysis, origin) = match self.classify_from_git(event).await {
      Ok(classified) => (classified, RevisionOrigin::Git),
      Err(e) if e.wants_fallback() => {
        let Some(fallback) = &self.fallback else {
          return Err(e);
        };
        let Some(set) = fallback.patch_set(event)? else {
          return Err(e);
        };
        warn!(delivery_id = %event.delivery_id, error = %e, "git source unavailable, using fallback source");
        (self.classify_from_patch(set, event).await?, RevisionOrigin::Fallback)
      }
      Err(e) => return Err(e),
    };

    let repo = RepoContext {
      repo_name: event.repository.clone(),
      branch: event.branch.clone(),
      commit_id: Some(event.after.clone()),
    };
    let assessed = impact_engine::assess(&analysis, &repo, &HistoricalContext::default(), &self.engine_config);

    let prioritization = if assessed.assessment.risk_level >= RiskLevel::Medium {
      let candidates = self.candidates(&assessed, &analysis).await;
      Some(impact_engine::prioritize(&assessed, &candidates, &self.engine_config))
    } else {
      None
    };

    Ok(AnalysisReport {
      origin,
      analysis,
      features: assessed.features,
      surface: assessed.surface,
      structural_risk_score: assessed.structural_risk_score,
      assessment: assessed.assessment,
      prioritization,
    })
  }

  async fn classify_from_git(&self, event: &ChangeEvent) -> Result<ClassifiedChange, PipelineError> {
    let path = self.workdirs.prepare(&event.repository).await?;

    let listed = {
      let (path, before, after) = (path.clone(), event.before.clone(), event.after.clone());
      tokio::task::spawn_blocking(move || -> Result<Vec<FileStatusEntry>, PipelineError> {
        let source = GitRevisionSource::open(&path)?;
        Ok(impact_engine::RevisionSource::list_changed_files(&source, &before, &after)?)
      })
    };
    let listing = bounded(listed, self.config.list_timeout, "list").await?;
    debug!(delivery_id = %event.delivery_id, files = listing.len(), "revision pair resolved");

    self.classify_blocking(event, move |before, after, config| {
      let source = GitRevisionSource::open(&path)?;
      Ok(impact_engine::analyze_listed(&source, before, after, listing, config)?)
    })
    .await
  }

  async fn classify_from_patch(&self, set: PatchSet, event: &ChangeEvent) -> Result<ClassifiedChange, PipelineError> {
    self
      .classify_blocking(event, move |before, after, config| {
        Ok(impact_engine::analyze(&set, before, after, config)?)
      })
      .await
  }

  async fn classify_blocking<F>(&self, event: &ChangeEvent, run: F) -> Result<ClassifiedChange, PipelineError>
  where
    F: FnOnce(&str, &str, &impact_engine::Config) -> Result<ClassifiedChange, PipelineError> + Send + 'static,
  {
    let (before, after) = (event.before.clone(), event.after.clone());
    let config = self.engine_config.clone();
    let task = tokio::task::spawn_blocking(move || run(&before, &after, &config));
    bounded(task, self.config.diff_timeout, "diff").await
  }

  /// Generated tests when the generator produces any, otherwise domain fallbacks.
  async fn candidates(&self, assessed: &Assessed, analysis: &ClassifiedChange) -> Vec<CandidateTest> {
    let domains = assessed.assessment.detected_risk_domains.clone();
    if let Some(generator) = &self.generator {
      let description = handoff::describe_change(&assessed.assessment, analysis);
      let generator = Arc::clone(generator);
      let task_domains = domains.clone();
      let generated =
        tokio::task::spawn_blocking(move || generator.generate(&description, &task_domains)).await;
      match generated {
        Ok(Ok(tests)) if !tests.is_empty() => return tests,
        Ok(Ok(_)) => debug!("generator returned no tests, using domain fallback"),
        Ok(Err(e)) => warn!(error = %e, "test generation failed, using domain fallback"),
        Err(e) => warn!(error = %e, "test generation task failed, using domain fallback"),
      }
    }
    handoff::fallback_candidates(&domains)
  }

  /// Score a raw feature vector with the configured classifier or rule variant.
  /// No keyword boost applies.
  pub fn score_features(&self, features: &RiskFeatureVector) -> RiskAssessment {
    RiskScorer::new(&self.engine_config, self.classifier.as_deref()).score(
      features,
      &KeywordScan::default(),
      None,
    )
  }

  pub fn workdir_path(&self, repo: &str) -> PathBuf {
    self.workdirs.path_for(repo)
  }
}
