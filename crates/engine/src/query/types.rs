//! Query engine types.
//!
//! - FilterSpec: the decoded search/filter/sort/paging parameters of one query
//! - SearchMode: how the free-text term is matched
//! - FilterValue: a loosely typed filter value, coerced per field later
//! - ResultPage: one page of typed results with paging metadata

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pagination::Pagination;

/// How the free-text search term is matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Weighted full-text index, ranked by relevance.
    #[default]
    #[serde(rename = "fulltext", alias = "full_text")]
    FullText,
    /// Case-insensitive equality.
    Exact,
    /// Case-insensitive substring.
    Fuzzy,
}

impl SearchMode {
    /// Parse a mode name; unknown or empty names fall back to full text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Self::Exact,
            "fuzzy" => Self::Fuzzy,
            _ => Self::FullText,
        }
    }
}

/// Filter value. Descriptors decide what type a key actually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Integer(i64),
    List(Vec<String>),
    Text(String),
}

impl FilterValue {
    /// Decode a single query-string value: booleans, integers and
    /// comma-separated lists are recognized, anything else is text.
    pub fn from_query_param(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Integer(n);
        }
        if raw.contains(',') {
            return Self::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        Self::Text(raw.to_string())
    }

    /// Whether this value carries nothing to filter on.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
            Self::Bool(_) | Self::Integer(_) => false,
        }
    }

    /// Get as a single text value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.trim().to_string()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::List(items) if items.len() == 1 => Some(items[0].trim().to_string()),
            Self::List(_) => None,
        }
    }

    /// Get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get as a list of non-empty text values.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Text(s) if s.contains(',') => Self::from_query_param(s).as_list(),
            other => other.as_text().into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// Tri-state reading: positive, zero (no preference), or negative.
    pub fn as_tri_state(&self) -> Option<i64> {
        match self {
            Self::Bool(true) => Some(1),
            Self::Bool(false) => Some(-1),
            Self::Integer(n) => Some(n.signum()),
            Self::Text(s) => match s.trim() {
                "true" | "yes" => Some(1),
                "false" | "no" => Some(-1),
                other => other.parse::<i64>().ok().map(i64::signum),
            },
            Self::List(_) => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<Uuid>> for FilterValue {
    fn from(value: Vec<Uuid>) -> Self {
        Self::List(value.iter().map(Uuid::to_string).collect())
    }
}

/// Normalized search/filter/sort/pagination parameters for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Free-text search term.
    #[serde(default)]
    pub search: String,

    /// How `search` is matched.
    #[serde(default)]
    pub search_mode: SearchMode,

    /// Field predicates keyed by filter name.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,

    /// Identities reported first, in this order, for resources that support
    /// pinning. Never filters.
    #[serde(default)]
    pub pinned: Vec<Uuid>,

    /// Sort token from the resource's allow-list.
    #[serde(default)]
    pub sort: String,

    /// 1-based page number.
    #[serde(default)]
    pub page: Option<i64>,

    /// Items per page.
    #[serde(default)]
    pub limit: Option<i64>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search term and mode.
    pub fn search(mut self, term: impl Into<String>, mode: SearchMode) -> Self {
        self.search = term.into();
        self.search_mode = mode;
        self
    }

    /// Add a field predicate.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Set pinned identities.
    pub fn pinned(mut self, ids: Vec<Uuid>) -> Self {
        self.pinned = ids;
        self
    }

    /// Set the sort token.
    pub fn sort(mut self, token: impl Into<String>) -> Self {
        self.sort = token.into();
        self
    }

    /// Set the page number.
    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The trimmed search term, if any.
    pub fn search_term(&self) -> Option<&str> {
        let term = self.search.trim();
        (!term.is_empty()).then_some(term)
    }

    /// A populated filter value for `key`.
    pub fn value(&self, key: &str) -> Option<&FilterValue> {
        self.filters.get(key).filter(|v| !v.is_empty())
    }
}

/// One page of typed results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage<T> {
    /// Items on this page, in resolved order.
    pub items: Vec<T>,

    /// Total matches, ignoring pagination.
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Items per page.
    pub limit: u32,

    /// Total number of pages (0 when there are no matches).
    pub total_pages: u32,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_previous: bool,
}

impl<T> ResultPage<T> {
    /// Create a page with paging calculations.
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        let total_pages = pagination.total_pages(total);
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages,
            has_next: pagination.page < total_pages,
            has_previous: pagination.page > 1,
        }
    }

    /// Create an empty page.
    pub fn empty(pagination: &Pagination) -> Self {
        Self::new(Vec::new(), 0, pagination)
    }

    /// Transform the items, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultPage<U> {
        ResultPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
