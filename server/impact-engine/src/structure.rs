//! Structural node extraction for Python sources (tree-sitter).
//!
//! Walks the syntax tree with an explicit worklist of `(node, parent)` pairs,
//! parent before child, so output order follows source order.

use tree_sitter::{Node, Parser};
use tracing::debug;

use crate::config::Config;
use crate::error::EngineError;
use crate::types::{NodeKind, StructuralNode};

/// Decorator expression shapes, resolved once into a plain name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DecoratorName {
  Simple(String),
  Dotted(Vec<String>),
  Called(Box<DecoratorName>),
}

impl DecoratorName {
  fn resolve(self) -> String {
    match self {
      Self::Simple(name) => name,
      Self::Dotted(parts) => parts.join("."),
      Self::Called(inner) => inner.resolve(),
    }
  }
}

/// Whether the file belongs to the deeply-supported language.
pub fn is_supported(path: &str) -> bool {
  path.to_ascii_lowercase().ends_with(".py")
}

pub struct StructureAnalyzer<'a> {
  config: &'a Config,
}

impl<'a> StructureAnalyzer<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self { config }
  }

  /// Extract functions, classes and imports. Fails with `Syntax` on unparsable text.
  pub fn extract_nodes(&self, path: &str, source: &str) -> Result<Vec<StructuralNode>, EngineError> {
    let mut parser = Parser::new();
    parser
      .set_language(&tree_sitter_python::LANGUAGE.into())
      .map_err(|e| EngineError::source(format!("python grammar: {}", e)))?;
    let tree = parser.parse(source, None).ok_or_else(|| EngineError::Syntax {
      path: path.to_string(),
      line: 1,
      message: "parser produced no tree".to_string(),
    })?;

    let root = tree.root_node();
    if root.has_error() {
      let (line, message) = first_error(root)
        .map(|n| {
          let what = if n.is_missing() {
            format!("missing {}", n.kind())
          } else {
            "invalid syntax".to_string()
          };
          (n.start_position().row + 1, what)
        })
        .unwrap_or((1, "invalid syntax".to_string()));
      return Err(EngineError::Syntax {
        path: path.to_string(),
        line,
        message,
      });
    }

    let bytes = source.as_bytes();
    let mut nodes = Vec::new();
    let mut stack: Vec<(Node, Option<String>)> = vec![(root, None)];

    while let Some((node, parent)) = stack.pop() {
      match node.kind() {
        "function_definition" | "class_definition" => {
          if let Some(rec) = self.definition(node, bytes, parent.clone(), Vec::new()) {
            push_body(&mut stack, node, Some(rec.name.clone()));
            nodes.push(rec);
          }
        }
        "decorated_definition" => {
          let decorators = decorator_names(node, bytes);
          if let Some(def) = node.child_by_field_name("definition") {
            if let Some(rec) = self.definition(def, bytes, parent.clone(), decorators) {
              push_body(&mut stack, def, Some(rec.name.clone()));
              nodes.push(rec);
            }
          }
        }
        "import_statement" | "import_from_statement" => {
          nodes.extend(import_nodes(node, bytes, parent));
        }
        _ => {
          let children: Vec<Node> = node.named_children(&mut node.walk()).collect();
          for child in children.into_iter().rev() {
            stack.push((child, parent.clone()));
          }
        }
      }
    }

    debug!(path, nodes = nodes.len(), "extracted structural nodes");
    Ok(nodes)
  }

  fn definition(
    &self,
    node: Node,
    src: &[u8],
    parent: Option<String>,
    decorators: Vec<String>,
  ) -> Option<StructuralNode> {
    let name = text(node.child_by_field_name("name")?, src);
    let is_class = node.kind() == "class_definition";
    let is_async = !is_class && has_child_kind(node, "async");
    let kind = if is_class {
      NodeKind::Class
    } else if is_async {
      NodeKind::AsyncFunction
    } else {
      NodeKind::Function
    };
    let parameters = if is_class {
      Vec::new()
    } else {
      node
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, src))
        .unwrap_or_default()
    };
    Some(StructuralNode {
      name,
      kind,
      start_line: node.start_position().row as u32 + 1,
      end_line: node.end_position().row as u32 + 1,
      parent,
      decorators,
      docstring: docstring(node, src, self.config.docstring_max_chars),
      is_async,
      parameters,
    })
  }
}

fn text(node: Node, src: &[u8]) -> String {
  node.utf8_text(src).unwrap_or_default().to_string()
}

fn has_child_kind(node: Node, kind: &str) -> bool {
  let mut cursor = node.walk();
  let found = node.children(&mut cursor).any(|c| c.kind() == kind);
  found
}

fn first_error(root: Node) -> Option<Node> {
  let mut stack = vec![root];
  while let Some(node) = stack.pop() {
    if node.is_error() || node.is_missing() {
      return Some(node);
    }
    if node.has_error() {
      let children: Vec<Node> = node.children(&mut node.walk()).collect();
      stack.extend(children.into_iter().rev());
    }
  }
  None
}

/// Queue the body's statements (reversed so they pop in source order).
fn push_body<'t>(stack: &mut Vec<(Node<'t>, Option<String>)>, def: Node<'t>, parent: Option<String>) {
  if let Some(body) = def.child_by_field_name("body") {
    let children: Vec<Node> = body.named_children(&mut body.walk()).collect();
    for child in children.into_iter().rev() {
      stack.push((child, parent.clone()));
    }
  }
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

fn decorator_expr(node: Node, src: &[u8]) -> Option<DecoratorName> {
  match node.kind() {
    "identifier" => Some(DecoratorName::Simple(text(node, src))),
    "attribute" => {
      let mut parts = Vec::new();
      let mut cur = node;
      loop {
        let attr = cur.child_by_field_name("attribute")?;
        parts.push(text(attr, src));
        let object = cur.child_by_field_name("object")?;
        if object.kind() == "attribute" {
          cur = object;
        } else {
          parts.push(text(object, src));
          break;
        }
      }
      parts.reverse();
      Some(DecoratorName::Dotted(parts))
    }
    "call" => {
      let func = node.child_by_field_name("function")?;
      decorator_expr(func, src).map(|inner| DecoratorName::Called(Box::new(inner)))
    }
    _ => None,
  }
}

fn decorator_names(decorated: Node, src: &[u8]) -> Vec<String> {
  let mut cursor = decorated.walk();
  let names = decorated
    .named_children(&mut cursor)
    .filter(|c| c.kind() == "decorator")
    .filter_map(|d| d.named_child(0))
    .filter_map(|expr| decorator_expr(expr, src))
    .map(DecoratorName::resolve)
    .collect();
  names
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn splat_name(node: Node, src: &[u8]) -> Option<String> {
  let prefix = match node.kind() {
    "list_splat_pattern" => "*",
    "dictionary_splat_pattern" => "**",
    _ => return None,
  };
  let ident = node.named_child(0)?;
  Some(format!("{}{}", prefix, text(ident, src)))
}

fn parameter_name(node: Node, src: &[u8]) -> Option<String> {
  match node.kind() {
    "identifier" => Some(text(node, src)),
    "list_splat_pattern" | "dictionary_splat_pattern" => splat_name(node, src),
    "default_parameter" | "typed_default_parameter" => {
      node.child_by_field_name("name").and_then(|n| parameter_name(n, src))
    }
    "typed_parameter" => {
      let inner = node.named_child(0)?;
      parameter_name(inner, src)
    }
    // `*` and `/` separators carry no name.
    _ => None,
  }
}

fn parameter_names(params: Node, src: &[u8]) -> Vec<String> {
  let mut cursor = params.walk();
  let names = params
    .named_children(&mut cursor)
    .filter_map(|p| parameter_name(p, src))
    .collect();
  names
}

// ---------------------------------------------------------------------------
// Docstrings
// ---------------------------------------------------------------------------

fn docstring(def: Node, src: &[u8], max_chars: usize) -> Option<String> {
  let body = def.child_by_field_name("body")?;
  let first = body.named_child(0)?;
  if first.kind() != "expression_statement" {
    return None;
  }
  let lit = first.named_child(0)?;
  if lit.kind() != "string" {
    return None;
  }
  let raw = text(lit, src);
  let cleaned = clean_doc(unquote(&raw)?);
  if cleaned.is_empty() {
    return None;
  }
  if cleaned.chars().count() > max_chars {
    let cut: String = cleaned.chars().take(max_chars).collect();
    return Some(format!("{}...", cut));
  }
  Some(cleaned)
}

/// Strip the prefix and quotes of a string literal. Byte and f-strings are not docstrings.
fn unquote(raw: &str) -> Option<&str> {
  let body_start = raw.find(['"', '\''])?;
  let prefix = raw[..body_start].to_ascii_lowercase();
  if prefix.contains('b') || prefix.contains('f') {
    return None;
  }
  let body = &raw[body_start..];
  for q in ["\"\"\"", "'''", "\"", "'"] {
    if body.len() >= 2 * q.len() && body.starts_with(q) && body.ends_with(q) {
      return Some(&body[q.len()..body.len() - q.len()]);
    }
  }
  None
}

/// Dedent continuation lines and trim blank edges, like Python's `inspect.cleandoc`.
fn clean_doc(doc: &str) -> String {
  let lines: Vec<&str> = doc.lines().collect();
  let Some((first, rest)) = lines.split_first() else {
    return String::new();
  };
  let indent = rest
    .iter()
    .filter(|l| !l.trim().is_empty())
    .map(|l| l.len() - l.trim_start().len())
    .min()
    .unwrap_or(0);

  let mut out: Vec<String> = vec![first.trim().to_string()];
  for line in rest {
    let dedented = line.get(indent..).unwrap_or_else(|| line.trim_start());
    out.push(dedented.trim_end().to_string());
  }
  while out.first().map(|l| l.is_empty()).unwrap_or(false) {
    out.remove(0);
  }
  while out.last().map(|l| l.is_empty()).unwrap_or(false) {
    out.pop();
  }
  out.join("\n")
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn imported_name(node: Node, src: &[u8]) -> Option<String> {
  match node.kind() {
    "dotted_name" => Some(text(node, src)),
    "aliased_import" => node.child_by_field_name("name").map(|n| text(n, src)),
    _ => None,
  }
}

fn import_nodes(node: Node, src: &[u8], parent: Option<String>) -> Vec<StructuralNode> {
  let start_line = node.start_position().row as u32 + 1;
  let end_line = node.end_position().row as u32 + 1;
  let make = |name: String| StructuralNode {
    name,
    kind: NodeKind::Import,
    start_line,
    end_line,
    parent: parent.clone(),
    decorators: Vec::new(),
    docstring: None,
    is_async: false,
    parameters: Vec::new(),
  };

  let mut cursor = node.walk();
  let names: Vec<String> = node
    .children_by_field_name("name", &mut cursor)
    .filter_map(|n| imported_name(n, src))
    .collect();

  if node.kind() == "import_statement" {
    return names.into_iter().map(make).collect();
  }

  let module = node
    .child_by_field_name("module_name")
    .map(|m| text(m, src).trim_start_matches('.').to_string())
    .unwrap_or_default();
  let qualify = |name: &str| {
    if module.is_empty() {
      name.to_string()
    } else {
      format!("{}.{}", module, name)
    }
  };

  if has_child_kind(node, "wildcard_import") {
    return vec![make(qualify("*"))];
  }
  names.iter().map(|n| make(qualify(n))).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn extract(src: &str) -> Vec<StructuralNode> {
    let config = Config::default();
    StructureAnalyzer::new(&config).extract_nodes("t.py", src).unwrap()
  }

  #[test]
  fn records_functions_classes_and_nesting() {
    let src = r#"
class UserService:
    """Manages users."""

    def create_user(self, name, *args, email=None, **kwargs):
        def validate(x):
            return x
        return validate(name)

async def fetch(url: str, timeout: int = 5):
    pass
"#;
    let nodes = extract(src);
    let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["UserService", "create_user", "validate", "fetch"]);

    assert_eq!(nodes[0].kind, NodeKind::Class);
    assert_eq!(nodes[0].start_line, 2);
    assert_eq!(nodes[0].docstring.as_deref(), Some("Manages users."));

    assert_eq!(nodes[1].parent.as_deref(), Some("UserService"));
    assert_eq!(nodes[1].parameters, vec!["self", "name", "*args", "email", "**kwargs"]);

    assert_eq!(nodes[2].parent.as_deref(), Some("create_user"));

    assert_eq!(nodes[3].kind, NodeKind::AsyncFunction);
    assert!(nodes[3].is_async);
    assert_eq!(nodes[3].parameters, vec!["url", "timeout"]);
    assert_eq!(nodes[3].start_line, 10);
    assert_eq!(nodes[3].end_line, 11);
  }

  #[test]
  fn resolves_decorator_shapes() {
    let src = r#"
@app.post("/api/login")
@login_required
@router.api.get
def login(request):
    pass
"#;
    let nodes = extract(src);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].decorators, vec!["app.post", "login_required", "router.api.get"]);
    assert_eq!(nodes[0].start_line, 5);
  }

  #[test]
  fn records_imports_per_name() {
    let src = "import os, sys as system\nfrom ..billing.gateway import charge, Refund as R\nfrom utils import *\n";
    let names: Vec<String> = extract(src).into_iter().map(|n| n.name).collect();
    assert_eq!(
      names,
      vec!["os", "sys", "billing.gateway.charge", "billing.gateway.Refund", "utils.*"]
    );
  }

  #[test]
  fn truncates_long_docstrings() {
    let long = "x".repeat(250);
    let src = format!("def f():\n    \"\"\"{}\"\"\"\n    pass\n", long);
    let nodes = extract(&src);
    let doc = nodes[0].docstring.as_deref().unwrap();
    assert_eq!(doc.len(), 203);
    assert!(doc.ends_with("..."));
  }

  #[test]
  fn dedents_multiline_docstrings() {
    let src = "def f():\n    \"\"\"\n    Summary line.\n\n        Indented detail.\n    \"\"\"\n";
    let nodes = extract(src);
    assert_eq!(nodes[0].docstring.as_deref(), Some("Summary line.\n\n    Indented detail."));
  }

  #[test]
  fn syntax_errors_report_a_line() {
    let config = Config::default();
    let err = StructureAnalyzer::new(&config)
      .extract_nodes("bad.py", "def ok():\n    pass\n\ndef broken(:\n    pass\n")
      .unwrap_err();
    match err {
      EngineError::Syntax { path, line, .. } => {
        assert_eq!(path, "bad.py");
        assert!(line >= 1);
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
