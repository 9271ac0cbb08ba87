//! Search parameters, normalization, and cache keys.

use crate::models::{ObservationType, Scope};
use serde::{Deserialize, Serialize};

/// Default result count.
pub const DEFAULT_LIMIT: usize = 20;

/// Hard ceiling on result count.
pub const MAX_LIMIT: usize = 100;

/// Which document family a search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Observations and session summaries together.
    #[default]
    All,
    /// Observations only.
    Observations,
    /// Session summaries only.
    Sessions,
    /// Raw user prompts only.
    Prompts,
}

impl SearchKind {
    /// Parses the wire value; empty or unknown strings mean `All`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "observations" => Self::Observations,
            "sessions" => Self::Sessions,
            "prompts" => Self::Prompts,
            _ => Self::All,
        }
    }

    /// Wire name used in cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "",
            Self::Observations => "observations",
            Self::Sessions => "sessions",
            Self::Prompts => "prompts",
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Fused relevance order.
    Relevance,
    /// Newest first (the default).
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
}

impl OrderBy {
    /// Parses the wire value; empty or unknown strings mean `DateDesc`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Self::Relevance,
            "date_asc" => Self::DateAsc,
            _ => Self::DateDesc,
        }
    }

    /// Wire name used in cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::DateDesc => "date_desc",
            Self::DateAsc => "date_asc",
        }
    }
}

/// How much of each document a result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// Titles and metadata only.
    #[default]
    Index,
    /// Full body content included.
    Full,
}

impl ResultFormat {
    /// Parses the wire value; empty or unknown strings mean `Index`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "full" => Self::Full,
            _ => Self::Index,
        }
    }

    /// Wire name used in cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Full => "full",
        }
    }
}

/// The closed parameter set for unified search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free-text query; empty selects filter-only mode.
    pub query: String,
    /// Document family.
    pub kind: SearchKind,
    /// Project scope.
    pub project: String,
    /// Restrict observations to one type.
    pub obs_type: Option<ObservationType>,
    /// Require all of these concept tags.
    pub concepts: Vec<String>,
    /// Require a touch on one of these paths.
    pub files: Vec<String>,
    /// Inclusive lower creation bound (epoch ms).
    pub date_start: Option<i64>,
    /// Inclusive upper creation bound (epoch ms).
    pub date_end: Option<i64>,
    /// Result ordering.
    pub order_by: OrderBy,
    /// Result count, clamped to `[1, MAX_LIMIT]`.
    pub limit: usize,
    /// Rows skipped before the first result.
    pub offset: usize,
    /// Body content inclusion.
    pub format: ResultFormat,
    /// Restrict to one scope.
    pub scope: Option<Scope>,
    /// Include global-scoped rows from other projects.
    pub include_global: bool,
    /// Drop superseded rows.
    pub exclude_superseded: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            kind: SearchKind::All,
            project: String::new(),
            obs_type: None,
            concepts: Vec::new(),
            files: Vec::new(),
            date_start: None,
            date_end: None,
            order_by: OrderBy::DateDesc,
            limit: DEFAULT_LIMIT,
            offset: 0,
            format: ResultFormat::Index,
            scope: None,
            include_global: true,
            exclude_superseded: true,
        }
    }
}

/// Lowercases, collapses whitespace runs to single spaces, and trims.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl SearchParams {
    /// Returns a copy with the query normalized and numeric fields
    /// defaulted/clamped. Run before anything touches the cache.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut params = self.clone();
        params.query = normalize_query(&self.query);
        params.limit = if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.min(MAX_LIMIT)
        };
        params
    }

    /// Cache key: a 64-bit hash of every normalized field, base-36
    /// encoded. Two parameter sets differing only by query whitespace or
    /// case produce equal keys.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let params = self.normalized();
        let mut joined = String::new();
        let mut push = |field: &str| {
            joined.push_str(field);
            joined.push('|');
        };
        push(&params.query);
        push(params.kind.as_str());
        push(&params.project);
        push(params.obs_type.map_or("", ObservationType::as_str));
        push(&params.concepts.join(","));
        push(&params.files.join(","));
        push(&params.date_start.map_or_else(String::new, |v| v.to_string()));
        push(&params.date_end.map_or_else(String::new, |v| v.to_string()));
        push(params.order_by.as_str());
        push(&params.limit.to_string());
        push(&params.offset.to_string());
        push(params.format.as_str());
        push(params.scope.map_or("", Scope::as_str));
        push(if params.include_global { "1" } else { "0" });
        push(if params.exclude_superseded { "1" } else { "0" });
        base36(fnv1a64(joined.as_bytes()))
    }
}

/// FNV-1a: stable across runs, unlike the std hasher.
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_query_collapses_whitespace() {
        assert_eq!(normalize_query("  JWT   Bypass\t\nFix "), "jwt bypass fix");
    }

    #[test]
    fn test_cache_key_ignores_query_case_and_whitespace() {
        let a = SearchParams {
            query: "JWT   Bypass".into(),
            ..SearchParams::default()
        };
        let b = SearchParams {
            query: " jwt bypass ".into(),
            ..SearchParams::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_distinguishes_fields() {
        let a = SearchParams::default();
        let b = SearchParams {
            limit: 50,
            ..SearchParams::default()
        };
        let c = SearchParams {
            include_global: false,
            ..SearchParams::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_limit_normalization() {
        let zero = SearchParams {
            limit: 0,
            ..SearchParams::default()
        };
        assert_eq!(zero.normalized().limit, DEFAULT_LIMIT);
        let big = SearchParams {
            limit: 5000,
            ..SearchParams::default()
        };
        assert_eq!(big.normalized().limit, MAX_LIMIT);
    }

    #[test]
    fn test_base36_shape() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    proptest! {
        /// Whitespace and case never change the key.
        #[test]
        fn prop_cache_key_stable_under_spacing(words in proptest::collection::vec("[a-zA-Z]{1,8}", 1..5)) {
            let tight = SearchParams {
                query: words.join(" "),
                ..SearchParams::default()
            };
            let sloppy = SearchParams {
                query: format!("  {}  ", words.join("   ")).to_uppercase(),
                ..SearchParams::default()
            };
            prop_assert_eq!(tight.cache_key(), sloppy.cache_key());
        }
    }
}
