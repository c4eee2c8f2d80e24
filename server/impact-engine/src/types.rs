//! Core types for the impact engine (JSON contracts + internal models).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Revision listing (what the revision-control collaborator reports)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
  Added,
  Modified,
  Deleted,
  Renamed,
}

impl FileStatus {
  /// Map a name-status letter (`A`, `M`, `D`, `R100`, `C75`, ...). Copies count as additions.
  pub fn from_status_letter(code: &str) -> Self {
    match code.chars().next().map(|c| c.to_ascii_uppercase()) {
      Some('A') | Some('C') => Self::Added,
      Some('D') => Self::Deleted,
      Some('R') => Self::Renamed,
      _ => Self::Modified,
    }
  }
}

/// One entry of the name-status listing between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatusEntry {
  pub path: String,
  pub status: FileStatus,
  #[serde(default)]
  pub old_path: Option<String>,
  /// Explicit line counts, when the collaborator can supply them.
  #[serde(default)]
  pub additions: Option<u32>,
  #[serde(default)]
  pub deletions: Option<u32>,
}

impl FileStatusEntry {
  pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
    Self {
      path: path.into(),
      status,
      old_path: None,
      additions: None,
      deletions: None,
    }
  }
}

// ---------------------------------------------------------------------------
// Line ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
  Added,
  Removed,
  Modified,
}

/// Inclusive line span, in the "after" numbering for added/modified hunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
  pub start: u32,
  pub end: u32,
  #[serde(rename = "type")]
  pub kind: LineKind,
}

impl LineRange {
  pub fn new(start: u32, end: u32, kind: LineKind) -> Self {
    debug_assert!(start <= end, "line range start {} > end {}", start, end);
    Self { start, end, kind }
  }

  /// Zero for an inverted range.
  pub fn len(&self) -> u32 {
    if self.end < self.start {
      return 0;
    }
    (self.end - self.start).saturating_add(1)
  }

  pub fn contains(&self, line: u32) -> bool {
    self.start <= line && line <= self.end
  }

  pub fn overlaps(&self, start: u32, end: u32) -> bool {
    !(end < self.start || start > self.end)
  }
}

// ---------------------------------------------------------------------------
// Structural nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Function,
  AsyncFunction,
  Class,
  Import,
}

impl NodeKind {
  pub fn is_callable(self) -> bool {
    matches!(self, Self::Function | Self::AsyncFunction)
  }
}

/// A function, class or import extracted from one file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralNode {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  pub start_line: u32,
  pub end_line: u32,
  pub parent: Option<String>,
  pub decorators: Vec<String>,
  pub docstring: Option<String>,
  pub is_async: bool,
  pub parameters: Vec<String>,
}

impl StructuralNode {
  /// Imports only feed component inference; they never absorb changed lines.
  pub fn maps_changes(&self) -> bool {
    self.kind != NodeKind::Import
  }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeCategory {
  #[serde(rename = "api_change")]
  Api,
  #[serde(rename = "service_change")]
  Service,
  #[serde(rename = "ui_change")]
  Ui,
  #[serde(rename = "config_change")]
  Config,
  #[serde(rename = "test_change")]
  Test,
  #[serde(rename = "docs_change")]
  Docs,
  #[serde(rename = "unknown_change")]
  Unknown,
}

impl ChangeCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Api => "api_change",
      Self::Service => "service_change",
      Self::Ui => "ui_change",
      Self::Config => "config_change",
      Self::Test => "test_change",
      Self::Docs => "docs_change",
      Self::Unknown => "unknown_change",
    }
  }
}

/// A retained changed file, with its ranges, raw display diff and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
  pub path: String,
  pub status: FileStatus,
  pub old_path: Option<String>,
  pub line_ranges: Vec<LineRange>,
  pub diff: String,
  #[serde(default)]
  pub additions: Option<u32>,
  #[serde(default)]
  pub deletions: Option<u32>,
  #[serde(default)]
  pub change_types: BTreeSet<ChangeCategory>,
  #[serde(default)]
  pub changed_nodes: Vec<StructuralNode>,
}

impl ChangedFile {
  pub fn from_entry(entry: &FileStatusEntry) -> Self {
    Self {
      path: entry.path.clone(),
      status: entry.status,
      old_path: entry.old_path.clone(),
      line_ranges: Vec::new(),
      diff: String::new(),
      additions: entry.additions,
      deletions: entry.deletions,
      change_types: BTreeSet::new(),
      changed_nodes: Vec::new(),
    }
  }

  /// Added and deleted line counts: explicit counts when known, else range spans.
  pub fn line_counts(&self) -> (u32, u32) {
    if let (Some(a), Some(d)) = (self.additions, self.deletions) {
      return (a, d);
    }
    let mut added = 0;
    let mut removed = 0;
    for r in &self.line_ranges {
      match r.kind {
        LineKind::Added | LineKind::Modified => added += r.len(),
        LineKind::Removed => removed += r.len(),
      }
    }
    (added, removed)
  }
}

/// One changed function or class, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFunction {
  pub file: String,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  pub start_line: u32,
  pub end_line: u32,
  pub parent: Option<String>,
  pub is_async: bool,
  pub change_type: LineKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
  pub total_files: usize,
  pub added_files: usize,
  pub modified_files: usize,
  pub deleted_files: usize,
  pub renamed_files: usize,
  pub functions_changed: usize,
  pub lines_added: u32,
  pub lines_deleted: u32,
  pub change_type_counts: BTreeMap<ChangeCategory, usize>,
}

/// Output of the classification stage for one revision pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedChange {
  pub before: String,
  pub after: String,
  pub changed_files: Vec<ChangedFile>,
  pub changed_functions: Vec<ChangedFunction>,
  pub change_types: BTreeSet<ChangeCategory>,
  pub affected_components: Vec<String>,
  pub summary: AnalysisSummary,
}

// ---------------------------------------------------------------------------
// Risk features (closed categorical domains; unknown inputs fall back to defaults)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
  Microservices,
  #[default]
  #[serde(other)]
  Monolith,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
  ApiChange,
  UiChange,
  ConfigChange,
  #[default]
  #[serde(other)]
  ServiceLogicChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentType {
  Api,
  Ui,
  #[default]
  #[serde(other)]
  Service,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionCategory {
  Auth,
  Payment,
  Search,
  Profile,
  Analytics,
  Admin,
  #[default]
  #[serde(other)]
  Misc,
}

impl FunctionCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Auth => "auth",
      Self::Payment => "payment",
      Self::Search => "search",
      Self::Profile => "profile",
      Self::Analytics => "analytics",
      Self::Admin => "admin",
      Self::Misc => "misc",
    }
  }

  pub fn is_critical(self) -> bool {
    matches!(self, Self::Auth | Self::Payment)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageLevel {
  Low,
  High,
  #[default]
  #[serde(other)]
  Medium,
}

/// Module names the trained classifier knows about.
pub const KNOWN_MODULES: &[&str] = &[
  "AdminConsole", "AnalyticsEngine", "AuditLogger", "AuthService", "AutocompleteHandler",
  "AvatarHandler", "BaseController", "BillingService", "CacheManager", "CommonUtils",
  "ConfigManager", "CoreModule", "CredentialStore", "DashboardService", "DataAggregator",
  "DataExporter", "EventTracker", "FacetProcessor", "FeatureFlagService", "FilterService",
  "GenericHandler", "HelperFunctions", "IndexManager", "InsightsProcessor", "InvoiceGenerator",
  "LoginHandler", "MaintenanceHandler", "MetricsCollector", "NotificationPrefs", "OAuthProvider",
  "PaymentGateway", "PayoutController", "PermissionValidator", "PrivacyController", "ProfileService",
  "ProfileValidator", "QueryOptimizer", "RankingAlgorithm", "RefundHandler", "ReportGenerator",
  "RoleController", "SearchEngine", "SessionController", "SharedLibrary", "SubscriptionManager",
  "SupportService", "SystemMonitor", "TokenManager", "TransactionProcessor", "TrendAnalyzer",
  "UserAuthenticator", "UserManager", "UserPreferences", "UtilityService", "WalletService",
];

pub const DEFAULT_MODULE: &str = "CoreModule";

/// A module name constrained to [`KNOWN_MODULES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleName(&'static str);

impl ModuleName {
  /// Case-insensitive exact match against the known list.
  pub fn lookup(name: &str) -> Option<Self> {
    KNOWN_MODULES
      .iter()
      .find(|m| m.eq_ignore_ascii_case(name.trim()))
      .map(|m| Self(*m))
  }

  pub fn resolve(name: &str) -> Self {
    Self::lookup(name).unwrap_or_default()
  }

  pub fn as_str(&self) -> &'static str {
    self.0
  }
}

impl Default for ModuleName {
  fn default() -> Self {
    Self(DEFAULT_MODULE)
  }
}

impl Serialize for ModuleName {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.0)
  }
}

impl<'de> Deserialize<'de> for ModuleName {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(Self::resolve(&raw))
  }
}

/// Flat feature vector consumed by the scorer and the trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFeatureVector {
  pub lines_changed: u32,
  pub files_changed: u32,
  pub dependency_depth: u32,
  /// 0 or 1.
  pub shared_component: u8,
  pub historical_failure_count: u32,
  pub historical_change_frequency: u32,
  pub days_since_last_failure: u32,
  pub tests_impacted: u32,
  pub repo_type: RepoType,
  pub module_name: ModuleName,
  pub change_type: ChangeKind,
  pub component_type: ComponentType,
  pub function_category: FunctionCategory,
  pub test_coverage_level: CoverageLevel,
}

impl Default for RiskFeatureVector {
  fn default() -> Self {
    Self {
      lines_changed: 0,
      files_changed: 0,
      dependency_depth: 1,
      shared_component: 0,
      historical_failure_count: 0,
      historical_change_frequency: 1,
      days_since_last_failure: 30,
      tests_impacted: 0,
      repo_type: RepoType::default(),
      module_name: ModuleName::default(),
      change_type: ChangeKind::default(),
      component_type: ComponentType::default(),
      function_category: FunctionCategory::default(),
      test_coverage_level: CoverageLevel::default(),
    }
  }
}

impl RiskFeatureVector {
  pub fn is_shared(&self) -> bool {
    self.shared_component != 0
  }
}

/// Repository-level context for feature extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoContext {
  pub repo_name: String,
  pub branch: Option<String>,
  pub commit_id: Option<String>,
}

/// Optional history for the changed area; defaults stand in when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalContext {
  pub failure_count: u32,
  pub change_frequency: u32,
  pub days_since_last_failure: u32,
  pub tests_impacted: Option<u32>,
}

impl Default for HistoricalContext {
  fn default() -> Self {
    Self {
      failure_count: 0,
      change_frequency: 1,
      days_since_last_failure: 30,
      tests_impacted: None,
    }
  }
}

/// Counts of API and UI files touched, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSurface {
  pub apis_impacted: u32,
  pub ui_components_impacted: u32,
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl RiskLevel {
  pub fn from_score(score: f64) -> Self {
    if score >= 0.7 {
      Self::High
    } else if score >= 0.4 {
      Self::Medium
    } else {
      Self::Low
    }
  }

  pub fn color(self) -> &'static str {
    match self {
      Self::High => "red",
      Self::Medium => "amber",
      Self::Low => "green",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
  Precomputed,
  Classifier,
  RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
  pub risk_score: f64,
  pub risk_level: RiskLevel,
  pub risk_color: String,
  pub recommended_action: String,
  pub action_justification: String,
  pub top_impact_factors: Vec<String>,
  pub detected_risk_domains: Vec<String>,
  pub keyword_risk_boost: f64,
  pub method: ScoreMethod,
}

// ---------------------------------------------------------------------------
// Test prioritization
// ---------------------------------------------------------------------------

/// A test proposed by the test-generation collaborator. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateTest {
  pub name: String,
  pub endpoint: String,
  pub method: String,
  pub payload: serde_json::Value,
  pub expected_status: u16,
  pub description: String,
  pub category: String,
}

impl Default for CandidateTest {
  fn default() -> Self {
    Self {
      name: String::new(),
      endpoint: "/".to_string(),
      method: "GET".to_string(),
      payload: serde_json::Value::Object(Default::default()),
      expected_status: 200,
      description: String::new(),
      category: "functional".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedTest {
  pub name: String,
  pub endpoint: String,
  pub method: String,
  pub payload: serde_json::Value,
  pub expected_status: u16,
  pub description: String,
  pub category: String,
  pub priority_score: f64,
  pub is_important: bool,
  pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
  Important,
  All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
  pub change_risk_score: f64,
  pub files_changed: u32,
  pub critical_module: bool,
  pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prioritization {
  pub selected_tests: Vec<PrioritizedTest>,
  pub all_tests: Vec<PrioritizedTest>,
  pub priority_level: PriorityLevel,
  pub total_count: usize,
  pub selected_count: usize,
  pub risk_context: RiskContext,
}

// ---------------------------------------------------------------------------
// Binary contract (stdin / stdout)
// ---------------------------------------------------------------------------

/// Input: one JSON object carrying a unified diff and the after-revision sources.
#[derive(Debug, Clone, Deserialize)]
pub struct Input {
  pub before: String,
  pub after: String,
  pub diff: String,
  /// After-revision file contents keyed by path (only needed for Python files).
  #[serde(default)]
  pub files: BTreeMap<String, String>,
  #[serde(default)]
  pub repo: RepoContext,
  #[serde(default)]
  pub history: HistoricalContext,
  #[serde(default)]
  pub candidate_tests: Vec<CandidateTest>,
}

/// Output: one JSON object for the caller to parse.
#[derive(Debug, Clone, Serialize)]
pub struct Output {
  pub analysis: ClassifiedChange,
  pub features: RiskFeatureVector,
  pub surface: ImpactSurface,
  pub structural_risk_score: f64,
  pub assessment: RiskAssessment,
  pub prioritization: Prioritization,
}
