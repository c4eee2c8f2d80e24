//! Keyword-domain scan: sensitive vocabulary in changed text raises risk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::ClassifiedChange;

/// Total keyword boost never exceeds this.
pub const MAX_KEYWORD_BOOST: f64 = 0.5;

/// One row of the domain table.
#[derive(Debug, Clone, Copy)]
pub struct KeywordDomain {
  pub name: &'static str,
  pub keywords: &'static [&'static str],
  pub boost: f64,
  pub label: &'static str,
  /// Minimum total occurrences before the domain counts.
  pub threshold: usize,
}

pub const KEYWORD_DOMAINS: &[KeywordDomain] = &[
  KeywordDomain {
    name: "security",
    keywords: &[
      "auth", "login", "logout", "password", "passwd", "pwd", "token", "session", "jwt", "oauth",
      "credential", "secret", "api_key", "apikey", "private_key", "encrypt", "decrypt", "hash",
      "salt", "bcrypt", "argon2", "permission", "role", "access_control", "acl", "rbac",
      "authenticate", "authorize",
    ],
    boost: 0.25,
    label: "Authentication/Security logic detected",
    threshold: 1,
  },
  KeywordDomain {
    name: "financial",
    keywords: &[
      "payment", "pay", "wallet", "transfer", "balance", "money", "currency", "transaction",
      "credit", "debit", "invoice", "billing", "checkout", "stripe", "paypal", "refund", "charge",
      "subscription", "price", "amount", "fee", "discount", "coupon", "order_total", "cart_total",
    ],
    boost: 0.30,
    label: "Financial/Payment logic detected",
    threshold: 1,
  },
  KeywordDomain {
    name: "state_mutation",
    keywords: &[
      "delete", "remove", "destroy", "drop", "truncate", "update", "modify", "alter", "insert",
      "create", "write", "commit", "rollback", "migrate", "bulk_update", "bulk_delete",
      "batch_insert", "cascade",
    ],
    boost: 0.15,
    label: "State mutation operations detected",
    threshold: 1,
  },
  KeywordDomain {
    name: "permission",
    keywords: &[
      "is_admin", "is_superuser", "has_permission", "check_permission", "grant", "revoke",
      "elevate", "sudo", "root", "admin_only", "require_auth", "require_admin", "protected",
      "restricted",
    ],
    boost: 0.20,
    label: "Permission/Access control changes detected",
    threshold: 1,
  },
  KeywordDomain {
    name: "error_handling",
    keywords: &[
      "try", "catch", "except", "finally", "raise", "throw", "error", "exception", "failure",
      "fallback", "retry", "timeout",
    ],
    boost: 0.10,
    label: "Error handling logic detected",
    threshold: 5,
  },
  KeywordDomain {
    name: "database_critical",
    keywords: &[
      "foreign_key", "primary_key", "index", "constraint", "schema", "migration", "alter_table",
      "drop_table", "create_table", "add_column", "drop_column", "rename_column",
    ],
    boost: 0.20,
    label: "Database schema changes detected",
    threshold: 1,
  },
  KeywordDomain {
    name: "api_endpoints",
    keywords: &[
      "@app.post", "@app.put", "@app.delete", "@router.post", "@router.put", "@router.delete",
      "api_view", "rest_framework", "serializer", "endpoint", "route",
    ],
    boost: 0.12,
    label: "API endpoint modifications detected",
    threshold: 1,
  },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordHit {
  pub keyword: String,
  pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMatch {
  pub matches: Vec<KeywordHit>,
  pub total_count: usize,
  pub boost_applied: f64,
}

/// Result of one scan. Domains appear in table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordScan {
  pub total_boost: f64,
  pub detected_domains: Vec<String>,
  pub keyword_matches: BTreeMap<String, DomainMatch>,
  pub risk_factors: Vec<String>,
}

/// Text the scanner looks at: diff text, changed node names and docstrings,
/// file paths and affected components.
pub fn scan_text(classified: &ClassifiedChange) -> String {
  let mut parts: Vec<&str> = Vec::new();
  for file in &classified.changed_files {
    parts.push(&file.diff);
    for node in &file.changed_nodes {
      parts.push(&node.name);
      if let Some(doc) = &node.docstring {
        parts.push(doc);
      }
    }
  }
  for file in &classified.changed_files {
    parts.push(&file.path);
  }
  for c in &classified.affected_components {
    parts.push(c);
  }
  parts.join(" ")
}

/// Count non-overlapping keyword occurrences per domain and sum the boosts.
pub fn scan(text: &str) -> KeywordScan {
  let content = text.to_lowercase();
  let mut out = KeywordScan::default();

  for domain in KEYWORD_DOMAINS {
    let matches: Vec<KeywordHit> = domain
      .keywords
      .iter()
      .filter_map(|kw| {
        let count = content.matches(kw).count();
        (count > 0).then(|| KeywordHit {
          keyword: kw.to_string(),
          count,
        })
      })
      .collect();
    let total_count: usize = matches.iter().map(|m| m.count).sum();
    if total_count < domain.threshold {
      continue;
    }
    out.detected_domains.push(domain.name.to_string());
    out.risk_factors.push(format!(
      "{} (+{}%)",
      domain.label,
      (domain.boost * 100.0).round() as i64
    ));
    out.total_boost += domain.boost;
    out.keyword_matches.insert(
      domain.name.to_string(),
      DomainMatch {
        matches,
        total_count,
        boost_applied: domain.boost,
      },
    );
  }

  out.total_boost = out.total_boost.min(MAX_KEYWORD_BOOST);
  out
}
