//! Search ranking strategies.
//!
//! Each [`SearchMode`] maps to one strategy. A strategy turns the search term
//! into a single predicate fragment and, for full text only, a relevance
//! expression. The relevance expression is selected as `search_rank` and used
//! for ordering; it never filters.

use sea_query::{Cond, Expr, SimpleExpr};

use super::descriptor::{Field, SearchFields};
use super::types::SearchMode;

/// Output column carrying the relevance score.
pub const RANK_ALIAS: &str = "search_rank";

/// Resource columns plus the text-search configuration.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub fields: &'a SearchFields,
    /// Validated text-search configuration name.
    pub language: &'a str,
}

/// A compiled search condition and the value it binds.
#[derive(Debug, Clone)]
pub struct SearchFragment {
    /// Binding name for the term.
    pub binding: &'static str,
    /// Bound value, after any pattern decoration.
    pub value: String,
    pub predicate: SimpleExpr,
}

/// Per-mode search behavior.
pub trait SearchStrategy: Send + Sync {
    fn mode(&self) -> SearchMode;

    /// Predicate for `term`, or `None` when the resource has no columns for
    /// this mode.
    fn fragment(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SearchFragment>;

    /// Relevance expression. Only full text ranks.
    fn rank(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SimpleExpr> {
        let _ = (ctx, term);
        None
    }
}

/// Weighted full-text match against the precomputed search vector. Resources
/// without a vector get the substring match instead, unranked.
pub struct FullTextSearch;

/// Case-insensitive equality over the resource's exact columns.
pub struct ExactSearch;

/// Case-insensitive substring over the resource's fuzzy columns.
pub struct FuzzySearch;

static FULL_TEXT: FullTextSearch = FullTextSearch;
static EXACT: ExactSearch = ExactSearch;
static FUZZY: FuzzySearch = FuzzySearch;

/// The strategy for a mode.
pub fn strategy_for(mode: SearchMode) -> &'static dyn SearchStrategy {
    match mode {
        SearchMode::FullText => &FULL_TEXT,
        SearchMode::Exact => &EXACT,
        SearchMode::Fuzzy => &FUZZY,
    }
}

fn match_sql(vector: &Field, language: &str) -> String {
    format!("{} @@ plainto_tsquery('{language}', $1)", vector.sql())
}

fn rank_sql(vector: &Field, language: &str) -> String {
    format!("ts_rank({}, plainto_tsquery('{language}', $1))", vector.sql())
}

impl SearchStrategy for FullTextSearch {
    fn mode(&self) -> SearchMode {
        SearchMode::FullText
    }

    fn fragment(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SearchFragment> {
        let Some(vector) = ctx.fields.vector.as_ref() else {
            return FUZZY.fragment(ctx, term);
        };
        // plainto_tsquery parses free text itself, so the term is bound as is.
        Some(SearchFragment {
            binding: "search_query",
            value: term.to_string(),
            predicate: Expr::cust_with_values(match_sql(vector, ctx.language), [term]),
        })
    }

    fn rank(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SimpleExpr> {
        let vector = ctx.fields.vector.as_ref()?;
        Some(Expr::cust_with_values(rank_sql(vector, ctx.language), [term]))
    }
}

impl SearchStrategy for ExactSearch {
    fn mode(&self) -> SearchMode {
        SearchMode::Exact
    }

    fn fragment(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SearchFragment> {
        let value = escape_like_wildcards(term);
        let predicate = any_ilike(ctx.fields.exact, &value)?;
        Some(SearchFragment {
            binding: "exact_search",
            value,
            predicate,
        })
    }
}

impl SearchStrategy for FuzzySearch {
    fn mode(&self) -> SearchMode {
        SearchMode::Fuzzy
    }

    fn fragment(&self, ctx: &SearchContext<'_>, term: &str) -> Option<SearchFragment> {
        let value = format!("%{}%", escape_like_wildcards(term));
        let predicate = any_ilike(ctx.fields.fuzzy, &value)?;
        Some(SearchFragment {
            binding: "fuzzy_search",
            value,
            predicate,
        })
    }
}

/// `(a ILIKE $1 OR b ILIKE $1 ...)`, one condition regardless of column count.
fn any_ilike(fields: &[Field], pattern: &str) -> Option<SimpleExpr> {
    if fields.is_empty() {
        return None;
    }
    let cond = fields.iter().fold(Cond::any(), |cond, field| {
        cond.add(ilike(field, pattern))
    });
    Some(cond.into())
}

/// `field ILIKE $1`, with `pattern` bound.
pub(crate) fn ilike(field: &Field, pattern: &str) -> SimpleExpr {
    Expr::cust_with_values(format!("{} ILIKE $1", field.sql()), [pattern])
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub(crate) fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Query};

    const FIELDS: SearchFields = SearchFields {
        vector: Some(Field::Column("search_vector")),
        exact: &[Field::Column("name"), Field::Column("description")],
        fuzzy: &[
            Field::Column("name"),
            Field::Column("description"),
            Field::Column("category_name"),
        ],
        suppressed_by: &[],
    };

    fn ctx() -> SearchContext<'static> {
        SearchContext {
            fields: &FIELDS,
            language: "spanish",
        }
    }

    fn render(expr: SimpleExpr) -> (String, usize) {
        let (sql, values) = Query::select()
            .expr(Expr::cust("1"))
            .and_where(expr)
            .build(PostgresQueryBuilder);
        (sql, values.0.len())
    }

    #[test]
    fn strategy_lookup_matches_mode() {
        for mode in [SearchMode::FullText, SearchMode::Exact, SearchMode::Fuzzy] {
            assert_eq!(strategy_for(mode).mode(), mode);
        }
    }

    #[test]
    fn full_text_fragment_is_parameterized() {
        let fragment = FULL_TEXT.fragment(&ctx(), "mesa redonda").unwrap();
        assert_eq!(fragment.binding, "search_query");
        let (sql, bound) = render(fragment.predicate);
        assert!(
            sql.contains("search_vector @@ plainto_tsquery('spanish', $1)"),
            "sql: {sql}"
        );
        assert!(!sql.contains("mesa"), "term must be bound: {sql}");
        assert_eq!(bound, 1);
    }

    #[test]
    fn only_full_text_ranks() {
        assert!(FULL_TEXT.rank(&ctx(), "mesa").is_some());
        assert!(EXACT.rank(&ctx(), "mesa").is_none());
        assert!(FUZZY.rank(&ctx(), "mesa").is_none());
    }

    #[test]
    fn full_text_without_vector_matches_substrings() {
        let fields = SearchFields {
            vector: None,
            ..FIELDS
        };
        let ctx = SearchContext {
            fields: &fields,
            language: "spanish",
        };
        let fragment = FULL_TEXT.fragment(&ctx, "mesa").unwrap();
        assert_eq!(fragment.binding, "fuzzy_search");
        assert_eq!(fragment.value, "%mesa%");
        assert!(FULL_TEXT.rank(&ctx, "mesa").is_none());
    }

    #[test]
    fn exact_escapes_wildcards() {
        let fragment = EXACT.fragment(&ctx(), "50%_off").unwrap();
        assert_eq!(fragment.value, "50\\%\\_off");
        let (sql, bound) = render(fragment.predicate);
        assert!(sql.contains("name ILIKE $1"), "sql: {sql}");
        assert!(sql.contains(" OR "), "sql: {sql}");
        assert_eq!(bound, 2);
    }

    #[test]
    fn fuzzy_wraps_in_wildcards_across_parent_name() {
        let fragment = FUZZY.fragment(&ctx(), "silla").unwrap();
        assert_eq!(fragment.value, "%silla%");
        let (sql, bound) = render(fragment.predicate);
        assert!(sql.contains("category_name ILIKE"), "sql: {sql}");
        assert_eq!(bound, 3);
    }

    #[test]
    fn escape_like_wildcards_basic() {
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
        assert_eq!(escape_like_wildcards("plain"), "plain");
    }
}
