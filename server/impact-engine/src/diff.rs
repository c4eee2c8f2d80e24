//! Revision diff parsing: file filtering, hunk headers, per-file line ranges.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::config::Config;
use crate::error::EngineError;
use crate::types::*;

/// Revision-control collaborator.
///
/// Implementations may block; callers that need a time budget run them on a
/// worker and map elapsed budgets to [`EngineError::DiffTimeout`].
pub trait RevisionSource {
  /// Name-status listing between two revisions.
  fn list_changed_files(&self, before: &str, after: &str) -> Result<Vec<FileStatusEntry>, EngineError>;

  /// Unified diff text between two revisions with `context_lines` of context.
  fn diff_text(&self, before: &str, after: &str, context_lines: u32) -> Result<String, EngineError>;

  /// File contents at a revision; `None` when the path does not exist there.
  fn file_content(&self, revision: &str, path: &str) -> Result<Option<String>, EngineError>;
}

// ---------------------------------------------------------------------------
// File filter
// ---------------------------------------------------------------------------

const DENY_PATTERNS: &[&str] = &[
  ".git/",
  ".gitignore",
  "node_modules/",
  "__pycache__/",
  "venv/",
  ".venv/",
  "dist/",
  "build/",
  ".egg-info/",
  "vendor/",
  ".min.js",
  ".min.css",
  "package-lock.json",
  "yarn.lock",
  "poetry.lock",
  "cargo.lock",
  "pnpm-lock.yaml",
  ".map",
];

const DENY_EXTENSIONS: &[&str] = &[
  // images
  "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tiff",
  // audio / video
  "mp3", "mp4", "wav", "avi", "mov", "mkv", "flac", "ogg", "webm",
  // documents
  "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
  // archives
  "zip", "tar", "gz", "bz2", "7z", "rar", "xz",
  // binaries
  "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "jar", "wasm",
  // fonts
  "ttf", "otf", "woff", "woff2", "eot",
  // databases
  "db", "sqlite", "sqlite3",
  // bytecode
  "pyc", "pyo", "pyd",
];

const SOURCE_EXTENSIONS: &[&str] = &[
  "py", "js", "ts", "jsx", "tsx", "java", "go", "rs", "c", "cpp", "h", "hpp", "cs", "rb", "php",
  "html", "htm", "css", "scss", "sass", "less", "vue", "svelte",
];

pub(crate) const CONFIG_EXTENSIONS: &[&str] = &[
  "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties",
];

const DOCS_PATTERNS: &[&str] = &[
  "readme",
  "changelog",
  "license",
  "contributing",
  "docs/",
  "documentation/",
  ".md",
  ".rst",
  ".txt",
];

/// Lowercased extension of the last path segment, without the dot.
pub(crate) fn extension(path: &str) -> Option<String> {
  let name = path.rsplit('/').next().unwrap_or(path);
  let (_, ext) = name.rsplit_once('.')?;
  if ext.is_empty() {
    return None;
  }
  Some(ext.to_ascii_lowercase())
}

/// True when the file should take part in analysis. Deny rules win over allow rules.
pub fn should_analyze(path: &str) -> bool {
  let p = path.to_lowercase();
  if DENY_PATTERNS.iter().any(|d| p.contains(d)) {
    return false;
  }
  let Some(ext) = extension(&p) else {
    return false;
  };
  if DENY_EXTENSIONS.contains(&ext.as_str()) {
    return false;
  }
  SOURCE_EXTENSIONS.contains(&ext.as_str()) || CONFIG_EXTENSIONS.contains(&ext.as_str())
}

pub fn is_docs_path(path: &str) -> bool {
  let p = path.to_lowercase();
  DOCS_PATTERNS.iter().any(|d| p.contains(d))
}

// ---------------------------------------------------------------------------
// Hunk headers
// ---------------------------------------------------------------------------

fn hunk_regex() -> &'static Regex {
  static HUNK: OnceLock<Regex> = OnceLock::new();
  HUNK.get_or_init(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid regex")
  })
}

/// Parsed `@@ -oldStart[,oldCount] +newStart[,newCount] @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
  pub old_start: u32,
  pub old_count: u32,
  pub new_start: u32,
  pub new_count: u32,
}

impl HunkHeader {
  /// Parse a header line; omitted counts default to 1.
  pub fn parse(line: &str) -> Option<Self> {
    let caps = hunk_regex().captures(line)?;
    let num = |i: usize, default: u32| -> Option<u32> {
      match caps.get(i) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(default),
      }
    };
    Some(Self {
      old_start: num(1, 0)?,
      old_count: num(2, 1)?,
      new_start: num(3, 0)?,
      new_count: num(4, 1)?,
    })
  }

  /// Range in the "after" numbering. Pure deletions have nothing to attribute.
  pub fn line_range(&self) -> Option<LineRange> {
    if self.new_count == 0 {
      return None;
    }
    let kind = if self.old_count == 0 {
      LineKind::Added
    } else {
      LineKind::Modified
    };
    Some(LineRange::new(
      self.new_start,
      self.new_start.saturating_add(self.new_count - 1),
      kind,
    ))
  }
}

/// Line ranges for one file section, in hunk order.
pub fn parse_line_ranges(section: &str) -> Vec<LineRange> {
  section
    .lines()
    .filter(|l| l.starts_with("@@"))
    .filter_map(HunkHeader::parse)
    .filter_map(|h| h.line_range())
    .collect()
}

// ---------------------------------------------------------------------------
// File sections
// ---------------------------------------------------------------------------

/// Paths from a `diff --git a/<old> b/<new>` header line.
pub(crate) fn parse_git_header(line: &str) -> Option<(String, String)> {
  let rest = line.strip_prefix("diff --git ")?;
  let rest = rest.strip_prefix("a/").unwrap_or(rest);
  let idx = rest.rfind(" b/")?;
  Some((rest[..idx].to_string(), rest[idx + 3..].to_string()))
}

/// Split a multi-file unified diff into sections keyed by the new path.
///
/// Each section keeps its `diff --git` header line so it can be shown as-is.
pub fn split_file_sections(diff: &str) -> BTreeMap<String, String> {
  let mut sections = BTreeMap::new();
  let mut current: Option<(String, String)> = None;

  for line in diff.lines() {
    if line.starts_with("diff --git ") {
      if let Some((path, text)) = current.take() {
        sections.insert(path, text);
      }
      current = parse_git_header(line).map(|(_, new)| (new, String::new()));
    }
    if let Some((_, text)) = current.as_mut() {
      text.push_str(line);
      text.push('\n');
    }
  }
  if let Some((path, text)) = current.take() {
    sections.insert(path, text);
  }
  sections
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Produces the per-file change list between two revisions.
pub struct DiffParser<'a> {
  config: &'a Config,
}

impl<'a> DiffParser<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self { config }
  }

  pub fn parse_diff(
    &self,
    source: &dyn RevisionSource,
    before: &str,
    after: &str,
  ) -> Result<Vec<ChangedFile>, EngineError> {
    if before.trim().is_empty() {
      return Err(EngineError::validation("before", "must not be empty"));
    }
    if after.trim().is_empty() {
      return Err(EngineError::validation("after", "must not be empty"));
    }

    let listing = source.list_changed_files(before, after)?;
    self.parse_listed(source, before, after, listing)
  }

  /// Same as `parse_diff`, over a name-status listing the caller already holds.
  pub fn parse_listed(
    &self,
    source: &dyn RevisionSource,
    before: &str,
    after: &str,
    listing: Vec<FileStatusEntry>,
  ) -> Result<Vec<ChangedFile>, EngineError> {
    let total = listing.len();
    let retained: Vec<FileStatusEntry> =
      listing.into_iter().filter(|e| should_analyze(&e.path)).collect();
    debug!(total, retained = retained.len(), "filtered changed files");
    if retained.is_empty() {
      return Ok(Vec::new());
    }

    let zero_context = split_file_sections(&source.diff_text(before, after, 0)?);
    let display = if self.config.display_context_lines == 0 {
      zero_context.clone()
    } else {
      split_file_sections(&source.diff_text(
        before,
        after,
        self.config.display_context_lines,
      )?)
    };

    let files = retained
      .iter()
      .map(|entry| {
        let mut file = ChangedFile::from_entry(entry);
        if let Some(section) = zero_context.get(&entry.path) {
          file.line_ranges = parse_line_ranges(section);
        }
        if let Some(section) = display.get(&entry.path) {
          file.diff = section.clone();
        }
        file
      })
      .collect();
    Ok(files)
  }
}
