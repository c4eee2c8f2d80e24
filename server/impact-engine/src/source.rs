//! In-memory revision source built from unified diff text.
//!
//! Accepts `git diff` output (or per-file patches as returned by a hosting
//! API), derives the name-status listing from the file headers, and can
//! re-emit the diff with zero context the way `git diff --unified=0` would.

use std::collections::BTreeMap;

use crate::diff::{parse_git_header, HunkHeader, RevisionSource};
use crate::error::EngineError;
use crate::types::{FileStatus, FileStatusEntry};

#[derive(Debug, Clone)]
struct PatchHunk {
  header: HunkHeader,
  /// Text after the closing `@@` (function context), kept for display.
  trailer: String,
  lines: Vec<String>,
}

#[derive(Debug, Clone)]
struct PatchFile {
  old_path: String,
  new_path: String,
  status: FileStatus,
  meta: Vec<String>,
  hunks: Vec<PatchHunk>,
}

impl PatchFile {
  fn new(old_path: String, new_path: String) -> Self {
    Self {
      old_path,
      new_path,
      status: FileStatus::Modified,
      meta: Vec::new(),
      hunks: Vec::new(),
    }
  }

  fn counts(&self) -> (u32, u32) {
    let mut added = 0;
    let mut removed = 0;
    for line in self.hunks.iter().flat_map(|h| h.lines.iter()) {
      if line.starts_with('+') {
        added += 1;
      } else if line.starts_with('-') {
        removed += 1;
      }
    }
    (added, removed)
  }

  fn entry(&self) -> FileStatusEntry {
    let (additions, deletions) = self.counts();
    let path = if self.status == FileStatus::Deleted && self.new_path.is_empty() {
      self.old_path.clone()
    } else {
      self.new_path.clone()
    };
    FileStatusEntry {
      path,
      status: self.status,
      old_path: (self.status == FileStatus::Renamed).then(|| self.old_path.clone()),
      additions: Some(additions),
      deletions: Some(deletions),
    }
  }

  fn render(&self, zero_context: bool, out: &mut String) {
    let new_path = if self.new_path.is_empty() { &self.old_path } else { &self.new_path };
    out.push_str(&format!("diff --git a/{} b/{}\n", self.old_path, new_path));
    for m in &self.meta {
      out.push_str(m);
      out.push('\n');
    }
    if self.hunks.is_empty() {
      return;
    }
    match self.status {
      FileStatus::Added => out.push_str("--- /dev/null\n"),
      _ => out.push_str(&format!("--- a/{}\n", self.old_path)),
    }
    match self.status {
      FileStatus::Deleted => out.push_str("+++ /dev/null\n"),
      _ => out.push_str(&format!("+++ b/{}\n", new_path)),
    }
    for hunk in &self.hunks {
      if zero_context {
        render_zero_context(hunk, out);
      } else {
        out.push_str(&format_header(&hunk.header, &hunk.trailer));
        for line in &hunk.lines {
          out.push_str(line);
          out.push('\n');
        }
      }
    }
  }
}

fn format_span(start: u32, count: u32) -> String {
  if count == 1 {
    start.to_string()
  } else {
    format!("{},{}", start, count)
  }
}

fn format_header(h: &HunkHeader, trailer: &str) -> String {
  format!(
    "@@ -{} +{} @@{}\n",
    format_span(h.old_start, h.old_count),
    format_span(h.new_start, h.new_count),
    trailer
  )
}

/// Split one hunk into git-style zero-context hunks, one per run of changed lines.
fn render_zero_context(hunk: &PatchHunk, out: &mut String) {
  let mut old_line = hunk.header.old_start.max(1);
  let mut new_line = hunk.header.new_start.max(1);
  // Pure insertions at the top of a file carry old_start 0.
  if hunk.header.old_count == 0 {
    old_line = hunk.header.old_start + 1;
  }
  if hunk.header.new_count == 0 {
    new_line = hunk.header.new_start + 1;
  }

  let mut removed: Vec<&str> = Vec::new();
  let mut added: Vec<&str> = Vec::new();
  let mut run_old = old_line;
  let mut run_new = new_line;

  for line in &hunk.lines {
    let changed = line.starts_with('-') || line.starts_with('+');
    if changed && removed.is_empty() && added.is_empty() {
      run_old = old_line;
      run_new = new_line;
    }
    if line.starts_with('-') {
      removed.push(line.as_str());
      old_line += 1;
    } else if line.starts_with('+') {
      added.push(line.as_str());
      new_line += 1;
    } else if !line.starts_with('\\') {
      flush_run(&hunk.trailer, &mut removed, &mut added, run_old, run_new, out);
      old_line += 1;
      new_line += 1;
    }
  }
  flush_run(&hunk.trailer, &mut removed, &mut added, run_old, run_new, out);
}

fn flush_run(
  trailer: &str,
  removed: &mut Vec<&str>,
  added: &mut Vec<&str>,
  run_old: u32,
  run_new: u32,
  out: &mut String,
) {
  if removed.is_empty() && added.is_empty() {
    return;
  }
  let old_count = removed.len() as u32;
  let new_count = added.len() as u32;
  let header = HunkHeader {
    old_start: if old_count == 0 { run_old - 1 } else { run_old },
    old_count,
    new_start: if new_count == 0 { run_new - 1 } else { run_new },
    new_count,
  };
  out.push_str(&format_header(&header, trailer));
  for l in removed.drain(..).chain(added.drain(..)) {
    out.push_str(l);
    out.push('\n');
  }
}

fn strip_side(path: &str, prefix: &str) -> Option<String> {
  let path = path.split('\t').next().unwrap_or(path).trim_end();
  if path == "/dev/null" {
    return None;
  }
  Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

/// Revision source backed by one parsed diff plus optional after-revision contents.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
  files: Vec<PatchFile>,
  contents: BTreeMap<String, String>,
  revisions: Option<(String, String)>,
}

impl PatchSet {
  /// Parse git-style or plain unified diff text.
  pub fn parse(diff: &str) -> Self {
    let mut files: Vec<PatchFile> = Vec::new();
    let mut in_header = false;
    // Old/new lines still owed to the current hunk.
    let mut remaining: (u32, u32) = (0, 0);

    for line in diff.lines() {
      if remaining != (0, 0) {
        if let Some(hunk) = files.last_mut().and_then(|f| f.hunks.last_mut()) {
          match line.chars().next() {
            Some('+') => remaining.1 = remaining.1.saturating_sub(1),
            Some('-') => remaining.0 = remaining.0.saturating_sub(1),
            Some('\\') => {}
            _ => {
              remaining.0 = remaining.0.saturating_sub(1);
              remaining.1 = remaining.1.saturating_sub(1);
            }
          }
          hunk.lines.push(if line.is_empty() { " ".to_string() } else { line.to_string() });
        }
        continue;
      }

      if line.starts_with('\\') {
        if let Some(hunk) = files.last_mut().and_then(|f| f.hunks.last_mut()) {
          hunk.lines.push(line.to_string());
        }
        continue;
      }

      if line.starts_with("diff --git ") {
        if let Some((old, new)) = parse_git_header(line) {
          files.push(PatchFile::new(old, new));
          in_header = true;
        }
        continue;
      }

      if line.starts_with("@@") {
        if let (Some(header), Some(file)) = (HunkHeader::parse(line), files.last_mut()) {
          let trailer = line
            .get(2..)
            .and_then(|rest| rest.find("@@").map(|i| rest[i + 2..].to_string()))
            .unwrap_or_default();
          file.hunks.push(PatchHunk { header, trailer, lines: Vec::new() });
          remaining = (header.old_count, header.new_count);
          in_header = false;
        }
        continue;
      }

      if let Some(rest) = line.strip_prefix("--- ") {
        if !in_header {
          // Plain unified diff: the `---` line opens a new file.
          files.push(PatchFile::new(String::new(), String::new()));
          in_header = true;
        }
        if let Some(file) = files.last_mut() {
          match strip_side(rest, "a/") {
            Some(p) => file.old_path = p,
            None => file.status = FileStatus::Added,
          }
        }
        continue;
      }

      if !in_header {
        continue;
      }
      let Some(file) = files.last_mut() else {
        continue;
      };

      if let Some(rest) = line.strip_prefix("+++ ") {
        match strip_side(rest, "b/") {
          Some(p) => file.new_path = p,
          None => {
            file.status = FileStatus::Deleted;
            if file.new_path.is_empty() {
              file.new_path = file.old_path.clone();
            }
          }
        }
        if file.old_path.is_empty() {
          file.old_path = file.new_path.clone();
        }
        continue;
      }

      if line.starts_with("new file mode") || line.starts_with("copy from") {
        file.status = FileStatus::Added;
      } else if line.starts_with("deleted file mode") {
        file.status = FileStatus::Deleted;
      } else if let Some(p) = line.strip_prefix("rename from ") {
        file.old_path = p.to_string();
        file.status = FileStatus::Renamed;
      } else if let Some(p) = line.strip_prefix("rename to ") {
        file.new_path = p.to_string();
        file.status = FileStatus::Renamed;
      }
      file.meta.push(line.to_string());
    }

    Self { files, ..Self::default() }
  }

  /// Build from per-file patches (hunks only, no file headers).
  pub fn from_file_patches(patches: Vec<(FileStatusEntry, String)>) -> Self {
    let files = patches
      .into_iter()
      .map(|(entry, patch)| {
        let old = entry.old_path.clone().unwrap_or_else(|| entry.path.clone());
        let header = format!("diff --git a/{} b/{}\n", old, entry.path);
        let mut parsed = Self::parse(&(header + &patch));
        let mut file = parsed
          .files
          .pop()
          .unwrap_or_else(|| PatchFile::new(old.clone(), entry.path.clone()));
        file.status = entry.status;
        file.old_path = old;
        file.new_path = entry.path;
        file
      })
      .collect();
    Self { files, ..Self::default() }
  }

  /// Attach after-revision file contents keyed by path.
  pub fn with_contents(mut self, contents: BTreeMap<String, String>) -> Self {
    self.contents = contents;
    self
  }

  /// Pin the revision pair this diff represents; other identifiers are rejected.
  pub fn with_revisions(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
    self.revisions = Some((before.into(), after.into()));
    self
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  fn check_pair(&self, before: &str, after: &str) -> Result<(), EngineError> {
    if let Some((b, a)) = &self.revisions {
      if b != before {
        return Err(EngineError::revision_not_found(before));
      }
      if a != after {
        return Err(EngineError::revision_not_found(after));
      }
    }
    Ok(())
  }
}

impl RevisionSource for PatchSet {
  fn list_changed_files(&self, before: &str, after: &str) -> Result<Vec<FileStatusEntry>, EngineError> {
    self.check_pair(before, after)?;
    Ok(self.files.iter().map(PatchFile::entry).collect())
  }

  fn diff_text(&self, before: &str, after: &str, context_lines: u32) -> Result<String, EngineError> {
    self.check_pair(before, after)?;
    let mut out = String::new();
    for file in &self.files {
      file.render(context_lines == 0, &mut out);
    }
    Ok(out)
  }

  fn file_content(&self, revision: &str, path: &str) -> Result<Option<String>, EngineError> {
    if let Some((before, after)) = &self.revisions {
      if revision == before {
        return Ok(None);
      }
      if revision != after {
        return Err(EngineError::revision_not_found(revision));
      }
    }
    Ok(self.contents.get(path).cloned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diff::{parse_line_ranges, split_file_sections};
  use crate::types::{LineKind, LineRange};

  const GIT_DIFF: &str = "\
diff --git a/app/routes.py b/app/routes.py
index 111..222 100644
--- a/app/routes.py
+++ b/app/routes.py
@@ -1,6 +1,7 @@ import os
 import os
-x = 1
+x = 2

 def a():
     pass
+    return 1

diff --git a/old_name.py b/new_name.py
similarity index 90%
rename from old_name.py
rename to new_name.py
diff --git a/gone.py b/gone.py
deleted file mode 100644
--- a/gone.py
+++ /dev/null
@@ -1,2 +0,0 @@
-a
-b
diff --git a/fresh.py b/fresh.py
new file mode 100644
--- /dev/null
+++ b/fresh.py
@@ -0,0 +1,3 @@
+def f():
+    return 1
+
";

  #[test]
  fn derives_name_status_listing() {
    let ps = PatchSet::parse(GIT_DIFF);
    let listing = ps.list_changed_files("a", "b").unwrap();
    assert_eq!(listing.len(), 4);
    assert_eq!(listing[0].status, FileStatus::Modified);
    assert_eq!((listing[0].additions, listing[0].deletions), (Some(2), Some(1)));
    assert_eq!(listing[1].status, FileStatus::Renamed);
    assert_eq!(listing[1].path, "new_name.py");
    assert_eq!(listing[1].old_path.as_deref(), Some("old_name.py"));
    assert_eq!(listing[2].status, FileStatus::Deleted);
    assert_eq!(listing[2].path, "gone.py");
    assert_eq!(listing[3].status, FileStatus::Added);
    assert_eq!(listing[3].additions, Some(3));
  }

  #[test]
  fn zero_context_rehunks_each_run() {
    let ps = PatchSet::parse(GIT_DIFF);
    let text = ps.diff_text("a", "b", 0).unwrap();
    let sections = split_file_sections(&text);
    assert_eq!(
      parse_line_ranges(&sections["app/routes.py"]),
      vec![
        LineRange::new(2, 2, LineKind::Modified),
        LineRange::new(6, 6, LineKind::Added),
      ]
    );
    assert!(parse_line_ranges(&sections["gone.py"]).is_empty());
    assert_eq!(
      parse_line_ranges(&sections["fresh.py"]),
      vec![LineRange::new(1, 3, LineKind::Added)]
    );
  }

  #[test]
  fn zero_context_headers_match_git_conventions() {
    let ps = PatchSet::parse(GIT_DIFF);
    let text = ps.diff_text("a", "b", 0).unwrap();
    assert!(text.contains("@@ -2 +2 @@ import os\n-x = 1\n+x = 2\n"));
    assert!(text.contains("@@ -5,0 +6 @@ import os\n+    return 1\n"));
    assert!(text.contains("@@ -1,2 +0,0 @@\n-a\n-b\n"));
  }

  #[test]
  fn display_text_keeps_context() {
    let ps = PatchSet::parse(GIT_DIFF);
    let text = ps.diff_text("a", "b", 3).unwrap();
    assert!(text.contains("@@ -1,6 +1,7 @@ import os\n import os\n"));
  }

  #[test]
  fn parses_plain_unified_diff() {
    let plain = "--- a/lib/util.py\t2024-01-01\n+++ b/lib/util.py\t2024-01-02\n@@ -3 +3,2 @@\n-a\n+b\n+c\n";
    let ps = PatchSet::parse(plain);
    let listing = ps.list_changed_files("x", "y").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].path, "lib/util.py");
    assert_eq!(listing[0].status, FileStatus::Modified);
    assert_eq!((listing[0].additions, listing[0].deletions), (Some(2), Some(1)));
  }

  #[test]
  fn per_file_patches_take_listing_status() {
    let entry = FileStatusEntry::new("api/users.py", FileStatus::Added);
    let ps = PatchSet::from_file_patches(vec![(entry, "@@ -0,0 +1,2 @@\n+a\n+b".to_string())]);
    let text = ps.diff_text("a", "b", 0).unwrap();
    let sections = split_file_sections(&text);
    assert_eq!(
      parse_line_ranges(&sections["api/users.py"]),
      vec![LineRange::new(1, 2, LineKind::Added)]
    );
  }

  #[test]
  fn pinned_revisions_reject_unknown_identifiers() {
    let ps = PatchSet::parse(GIT_DIFF).with_revisions("abc", "def");
    assert!(ps.list_changed_files("abc", "def").is_ok());
    assert!(matches!(
      ps.list_changed_files("abc", "zzz"),
      Err(EngineError::RevisionNotFound { .. })
    ));
    assert_eq!(ps.file_content("abc", "fresh.py").unwrap(), None);
  }
}
