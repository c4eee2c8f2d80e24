//! Change categories from file paths, structural nodes and changed line ranges.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::diff::{extension, is_docs_path, CONFIG_EXTENSIONS};
use crate::types::*;

const API_DECORATORS: &[&str] = &[
  "route",
  "get",
  "post",
  "put",
  "delete",
  "patch",
  "head",
  "options",
  "app.route",
  "app.get",
  "app.post",
  "app.put",
  "app.delete",
  "router.get",
  "router.post",
  "router.put",
  "router.delete",
  "api_view",
  "action",
  "endpoint",
  "blueprint.route",
  "bp.route",
];

const SERVICE_DECORATORS: &[&str] = &[
  "celery.task",
  "task",
  "background_task",
  "job",
  "cached",
  "cache",
  "memoize",
  "transaction",
  "atomic",
  "retry",
  "backoff",
];

const API_NAME_SUFFIXES: &[&str] = &["_handler", "_endpoint", "_route", "_view", "_api"];
const SERVICE_NAME_SUFFIXES: &[&str] = &["_service", "_manager", "_processor", "_worker"];
const UI_NAME_SUFFIXES: &[&str] = &["_component", "_widget", "_render", "_display"];

const UI_EXTENSIONS: &[&str] = &["jsx", "tsx", "vue", "svelte", "css", "scss", "less", "html"];
const UI_FRAGMENTS: &[&str] = &["/components/", "/pages/", "/views/"];
const API_FRAGMENTS: &[&str] = &["/api/", "/routes/", "/endpoints/"];

const COMPONENT_STOPLIST: &[&str] = &["src", "lib", "app", "backend", "frontend", "api", "core"];

/// Lowercased path with a leading slash so top-level directories match fragments.
fn rooted(path: &str) -> String {
  let p = path.to_lowercase();
  if p.starts_with('/') {
    p
  } else {
    format!("/{}", p)
  }
}

pub(crate) fn is_test_path(path: &str) -> bool {
  let p = rooted(path);
  p.contains("/test") || p.contains("test_") || p.contains("_test.")
}

pub(crate) fn is_config_path(path: &str) -> bool {
  extension(path).is_some_and(|e| CONFIG_EXTENSIONS.contains(&e.as_str()))
}

pub(crate) fn is_ui_path(path: &str) -> bool {
  let p = rooted(path);
  extension(&p).is_some_and(|e| UI_EXTENSIONS.contains(&e.as_str()))
    || UI_FRAGMENTS.iter().any(|f| p.contains(f))
}

pub(crate) fn is_api_path(path: &str) -> bool {
  let p = rooted(path);
  API_FRAGMENTS.iter().any(|f| p.contains(f))
}

/// File-level category from the path table: docs, test, config, UI, API, else service.
pub fn file_category(path: &str) -> ChangeCategory {
  if is_docs_path(path) {
    ChangeCategory::Docs
  } else if is_test_path(path) {
    ChangeCategory::Test
  } else if is_config_path(path) {
    ChangeCategory::Config
  } else if is_ui_path(path) {
    ChangeCategory::Ui
  } else if is_api_path(path) {
    ChangeCategory::Api
  } else {
    ChangeCategory::Service
  }
}

/// Categories for one structural node; SERVICE when nothing matches.
pub fn node_categories(node: &StructuralNode) -> BTreeSet<ChangeCategory> {
  let mut cats = BTreeSet::new();

  for dec in &node.decorators {
    let d = dec.to_lowercase();
    if API_DECORATORS.iter().any(|a| d.contains(a)) {
      cats.insert(ChangeCategory::Api);
    }
    if SERVICE_DECORATORS.iter().any(|s| d.contains(s)) {
      cats.insert(ChangeCategory::Service);
    }
  }

  let name = node.name.to_lowercase();
  if name.starts_with("test_") || name.ends_with("_test") {
    cats.insert(ChangeCategory::Test);
  }
  if API_NAME_SUFFIXES.iter().any(|s| name.ends_with(s)) {
    cats.insert(ChangeCategory::Api);
  }
  if UI_NAME_SUFFIXES.iter().any(|s| name.ends_with(s)) {
    cats.insert(ChangeCategory::Ui);
  }
  if SERVICE_NAME_SUFFIXES.iter().any(|s| name.ends_with(s)) {
    cats.insert(ChangeCategory::Service);
  }

  if cats.is_empty() {
    cats.insert(ChangeCategory::Service);
  }
  cats
}

/// Nodes touched by any range, once each, in node order, with the kind of the
/// first range that overlaps them. Imports never absorb changes.
pub fn changed_nodes(ranges: &[LineRange], nodes: &[StructuralNode]) -> Vec<(StructuralNode, LineKind)> {
  nodes
    .iter()
    .filter(|n| n.maps_changes())
    .filter_map(|n| {
      ranges
        .iter()
        .find(|r| r.overlaps(n.start_line, n.end_line))
        .map(|r| (n.clone(), r.kind))
    })
    .collect()
}

/// Directory segments outside the stoplist plus changed class names and
/// `parent.child` for nested callables; sorted, de-duplicated.
pub fn affected_components(files: &[ChangedFile]) -> Vec<String> {
  let mut components = BTreeSet::new();
  for file in files {
    for part in file.path.split('/') {
      if part.is_empty()
        || COMPONENT_STOPLIST.contains(&part)
        || part.starts_with('.')
        || part.starts_with("__")
        || extension(part).is_some()
      {
        continue;
      }
      components.insert(part.to_string());
    }
    for node in &file.changed_nodes {
      match (node.kind, &node.parent) {
        (NodeKind::Class, _) => {
          components.insert(node.name.clone());
        }
        (k, Some(parent)) if k.is_callable() => {
          components.insert(format!("{}.{}", parent, node.name));
        }
        _ => {}
      }
    }
  }
  components.into_iter().collect()
}

fn summarize(files: &[ChangedFile], functions: &[ChangedFunction]) -> AnalysisSummary {
  let mut summary = AnalysisSummary {
    total_files: files.len(),
    functions_changed: functions.len(),
    ..AnalysisSummary::default()
  };
  for f in files {
    match f.status {
      FileStatus::Added => summary.added_files += 1,
      FileStatus::Modified => summary.modified_files += 1,
      FileStatus::Deleted => summary.deleted_files += 1,
      FileStatus::Renamed => summary.renamed_files += 1,
    }
    let (added, removed) = f.line_counts();
    summary.lines_added += added;
    summary.lines_deleted += removed;
    for cat in &f.change_types {
      *summary.change_type_counts.entry(*cat).or_insert(0) += 1;
    }
  }
  summary
}

/// Attach changed nodes and categories to each file and aggregate the result.
///
/// `nodes_by_file` holds the after-revision nodes for files that parsed; files
/// missing from it keep their path category only.
pub fn classify(
  before: &str,
  after: &str,
  mut files: Vec<ChangedFile>,
  nodes_by_file: &BTreeMap<String, Vec<StructuralNode>>,
) -> ClassifiedChange {
  let mut changed_functions = Vec::new();

  for file in files.iter_mut() {
    file.change_types.insert(file_category(&file.path));

    if file.status == FileStatus::Deleted {
      file.change_types.insert(ChangeCategory::Unknown);
      continue;
    }
    let Some(nodes) = nodes_by_file.get(&file.path) else {
      continue;
    };

    let touched = changed_nodes(&file.line_ranges, nodes);
    for (node, kind) in &touched {
      file.change_types.extend(node_categories(node));
      changed_functions.push(ChangedFunction {
        file: file.path.clone(),
        name: node.name.clone(),
        kind: node.kind,
        start_line: node.start_line,
        end_line: node.end_line,
        parent: node.parent.clone(),
        is_async: node.is_async,
        change_type: *kind,
      });
    }
    file.changed_nodes = touched.into_iter().map(|(n, _)| n).collect();
  }

  let change_types: BTreeSet<ChangeCategory> =
    files.iter().flat_map(|f| f.change_types.iter().copied()).collect();
  let affected = affected_components(&files);
  let summary = summarize(&files, &changed_functions);
  debug!(
    files = files.len(),
    functions = changed_functions.len(),
    components = affected.len(),
    "classified change"
  );

  ClassifiedChange {
    before: before.to_string(),
    after: after.to_string(),
    changed_files: files,
    changed_functions,
    change_types,
    affected_components: affected,
    summary,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node(name: &str, kind: NodeKind, start: u32, end: u32) -> StructuralNode {
    StructuralNode {
      name: name.to_string(),
      kind,
      start_line: start,
      end_line: end,
      parent: None,
      decorators: Vec::new(),
      docstring: None,
      is_async: false,
      parameters: Vec::new(),
    }
  }

  #[test]
  fn path_table_precedence() {
    assert_eq!(file_category("docs/guide.py"), ChangeCategory::Docs);
    assert_eq!(file_category("tests/test_auth.py"), ChangeCategory::Test);
    assert_eq!(file_category("config/settings.yaml"), ChangeCategory::Config);
    assert_eq!(file_category("web/components/Nav.jsx"), ChangeCategory::Ui);
    assert_eq!(file_category("server/api/users.py"), ChangeCategory::Api);
    assert_eq!(file_category("api/users.py"), ChangeCategory::Api);
    assert_eq!(file_category("billing/gateway.py"), ChangeCategory::Service);
  }

  #[test]
  fn route_fragments_are_directories() {
    assert_eq!(file_category("app/routes/users.py"), ChangeCategory::Api);
    assert_eq!(file_category("svc/endpoints/health.py"), ChangeCategory::Api);
    assert_eq!(file_category("app/routes.py"), ChangeCategory::Service);
  }

  #[test]
  fn decorators_and_suffixes_drive_node_categories() {
    let mut n = node("login", NodeKind::Function, 1, 5);
    n.decorators = vec!["app.post".to_string()];
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Api]));

    let n = node("payment_processor", NodeKind::Function, 1, 5);
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Service]));

    let n = node("header_widget", NodeKind::Function, 1, 5);
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Ui]));

    let n = node("test_login", NodeKind::Function, 1, 5);
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Test]));

    let mut n = node("sync_accounts", NodeKind::Function, 1, 5);
    n.decorators = vec!["celery.task".to_string()];
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Service]));

    let n = node("helper", NodeKind::Function, 1, 5);
    assert_eq!(node_categories(&n), BTreeSet::from([ChangeCategory::Service]));
  }

  #[test]
  fn each_node_recorded_once_with_first_range_kind() {
    let nodes = vec![
      node("os", NodeKind::Import, 1, 1),
      node("a", NodeKind::Function, 3, 10),
      node("b", NodeKind::Function, 12, 20),
    ];
    let ranges = vec![
      LineRange::new(1, 1, LineKind::Modified),
      LineRange::new(4, 4, LineKind::Added),
      LineRange::new(8, 13, LineKind::Modified),
    ];
    let touched = changed_nodes(&ranges, &nodes);
    let names: Vec<(&str, LineKind)> = touched.iter().map(|(n, k)| (n.name.as_str(), *k)).collect();
    assert_eq!(names, vec![("a", LineKind::Added), ("b", LineKind::Modified)]);
  }

  #[test]
  fn components_skip_generic_dirs_and_file_names() {
    let mut f = ChangedFile::from_entry(&FileStatusEntry::new(
      "src/payments/core/stripe/client.py",
      FileStatus::Modified,
    ));
    let mut method = node("charge", NodeKind::Function, 5, 9);
    method.parent = Some("StripeClient".to_string());
    f.changed_nodes = vec![node("StripeClient", NodeKind::Class, 1, 20), method];
    assert_eq!(
      affected_components(&[f]),
      vec!["StripeClient", "StripeClient.charge", "payments", "stripe"]
    );
  }

  #[test]
  fn deleted_files_get_path_category_plus_unknown() {
    let files = vec![ChangedFile::from_entry(&FileStatusEntry::new(
      "billing/old.py",
      FileStatus::Deleted,
    ))];
    let out = classify("a", "b", files, &BTreeMap::new());
    assert_eq!(
      out.changed_files[0].change_types,
      BTreeSet::from([ChangeCategory::Service, ChangeCategory::Unknown])
    );
    assert_eq!(out.summary.deleted_files, 1);
  }

  #[test]
  fn classify_unions_node_categories_into_file() {
    let mut f = ChangedFile::from_entry(&FileStatusEntry::new("billing/views.py", FileStatus::Modified));
    f.line_ranges = vec![LineRange::new(2, 4, LineKind::Modified)];
    let mut handler = node("refund_handler", NodeKind::Function, 1, 6);
    handler.decorators = vec!["router.post".to_string()];
    let nodes = BTreeMap::from([("billing/views.py".to_string(), vec![handler])]);

    let out = classify("a", "b", vec![f], &nodes);
    assert_eq!(
      out.changed_files[0].change_types,
      BTreeSet::from([ChangeCategory::Api, ChangeCategory::Service])
    );
    assert_eq!(out.changed_functions.len(), 1);
    assert_eq!(out.changed_functions[0].change_type, LineKind::Modified);
    assert_eq!(out.summary.change_type_counts[&ChangeCategory::Api], 1);
    assert_eq!(out.summary.lines_added, 3);
  }
}
