//! SQL denylist gate.
//!
//! A static, case-insensitive pattern check that rejects script tags and
//! quote- or paren-prefixed `DROP TABLE`, `TRUNCATE`, `UPDATE` and `DELETE`
//! fragments. It is a coarse filter for string-built queries, not a parser;
//! parameterized queries remain the real defense.

use std::sync::LazyLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const DENYLIST_PATTERNS: &[&str] = &[
    r"(?i)<script[\s\S]*?>[\s\S]*?</script[\s\S]*?>",
    r#"(?i)["')(]\s*DROP\s+TABLE"#,
    r#"(?i)"\s*DROP"#,
    r"(?i)['()]\s*DROP\*",
    r#"(?i)["')(]\s*(TRUNCATE|UPDATE|DELETE)"#,
    r#"(?i)(""|'')\s*;?\s*(TRUNCATE|DROP|UPDATE|DELETE)"#,
];

/// `None` if the patterns failed to compile; every query is then rejected.
static DENYLIST: LazyLock<Option<RegexSet>> =
    LazyLock::new(|| RegexSet::new(DENYLIST_PATTERNS).ok());

/// Whether the denylist accepts `sql`.
pub fn inspect_query(sql: &str) -> bool {
    DENYLIST
        .as_ref()
        .is_some_and(|denylist| !denylist.is_match(sql))
}

/// Outcome category of a gated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryDetails {
    /// The query passed the gate.
    Accepted,
    /// The query matched the denylist.
    DangerQuery,
    /// The query was empty.
    InvalidEntries,
}

/// Uniform result envelope for a gated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueryEnvelope {
    pub success: bool,
    pub details: QueryDetails,
    pub message: String,
}

/// Run `sql` through the denylist.
///
/// With `disable_protection` a denylisted query is accepted anyway; an
/// empty query is rejected regardless.
pub fn guard_query(sql: &str, disable_protection: bool) -> QueryEnvelope {
    if sql.trim().is_empty() {
        return QueryEnvelope {
            success: false,
            details: QueryDetails::InvalidEntries,
            message: "The query parameter must be a non-empty string".to_string(),
        };
    }

    if !disable_protection && !inspect_query(sql) {
        return QueryEnvelope {
            success: false,
            details: QueryDetails::DangerQuery,
            message: "Potential malformed or malicious SQL query; resubmit with \
                      disable_protection to bypass the check"
                .to_string(),
        };
    }

    QueryEnvelope {
        success: true,
        details: QueryDetails::Accepted,
        message: "Query accepted".to_string(),
    }
}
