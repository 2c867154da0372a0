//! Per-resource descriptor tables.
//!
//! A descriptor is the only place that names SQL for a resource: its source
//! relation and joins, selected columns, the filter keys it accepts and the
//! predicate template each one compiles to, its search columns, and its sort
//! allow-list. Client input selects entries from these tables; it never
//! becomes SQL text.

use sea_query::{Alias, Expr, SimpleExpr};

/// A column or trusted SQL expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Unqualified column of the base relation.
    Column(&'static str),
    /// `table.column`.
    Qualified(&'static str, &'static str),
    /// Trusted SQL expression, e.g. `json_array_length(paragraphs)`.
    Raw(&'static str),
}

impl Field {
    /// Expression for use with the sea-query builders.
    pub fn expr(&self) -> SimpleExpr {
        match self {
            Self::Column(col) => Expr::col(Alias::new(*col)).into(),
            Self::Qualified(table, col) => Expr::col((Alias::new(*table), Alias::new(*col))).into(),
            Self::Raw(sql) => Expr::cust(*sql),
        }
    }

    /// Plain SQL text, for splicing into custom fragments.
    pub fn sql(&self) -> String {
        match self {
            Self::Column(col) => (*col).to_string(),
            Self::Qualified(table, col) => format!("{table}.{col}"),
            Self::Raw(sql) => (*sql).to_string(),
        }
    }
}

/// Type a filter value is coerced to before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Uuid,
    Integer,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date.
    Timestamp,
}

/// How one filter key compiles to a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateTemplate {
    /// `field = $v`
    Equals(Field, ValueKind),
    /// `field IN ($v1, ...)`
    AnyOf(Field, ValueKind),
    /// `field NOT IN ($v1, ...)`
    NoneOf(Field, ValueKind),
    /// `field >= $v`; dates mean start of day.
    AtLeast(Field, ValueKind),
    /// `field <= $v`; dates mean end of day.
    AtMost(Field, ValueKind),
    /// `field ILIKE '%v%'` with wildcards in `v` escaped.
    Contains(Field),
    /// Positive selects `positive`, negative selects `negative`, zero adds nothing.
    Flag {
        positive: &'static str,
        negative: &'static str,
    },
    /// `DATE(field) = DATE($v)`
    SameDay(Field),
    /// Trusted fragment with a single `$1` parameter.
    Custom { sql: &'static str, kind: ValueKind },
}

/// One accepted filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRule {
    pub key: &'static str,
    pub template: PredicateTemplate,
    /// Keys that, when populated, silence this one.
    pub suppressed_by: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(key: &'static str, template: PredicateTemplate) -> Self {
        Self {
            key,
            template,
            suppressed_by: &[],
        }
    }

    pub const fn suppressed_by(mut self, keys: &'static [&'static str]) -> Self {
        self.suppressed_by = keys;
        self
    }
}

/// Columns consulted by each search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFields {
    /// Precomputed weighted `tsvector`, maintained outside this engine.
    pub vector: Option<Field>,
    /// Compared case-insensitively for equality.
    pub exact: &'static [Field],
    /// Compared case-insensitively as substrings.
    pub fuzzy: &'static [Field],
    /// Filter keys that, when populated, silence the search term.
    pub suppressed_by: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: Field,
    pub direction: Direction,
    pub nulls_last: bool,
}

impl OrderTerm {
    pub const fn asc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Asc,
            nulls_last: false,
        }
    }

    pub const fn desc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Desc,
            nulls_last: false,
        }
    }

    pub const fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }
}

/// One entry of a sort allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Accepted tokens (lowercase).
    pub tokens: &'static [&'static str],
    /// Terms that define this sort.
    pub primary: &'static [OrderTerm],
    /// Terms appended after the primary terms, and after relevance when ranking.
    pub tiebreak: &'static [OrderTerm],
}

impl SortKey {
    pub const fn new(tokens: &'static [&'static str], primary: &'static [OrderTerm]) -> Self {
        Self {
            tokens,
            primary,
            tiebreak: &[],
        }
    }

    pub const fn then(mut self, tiebreak: &'static [OrderTerm]) -> Self {
        self.tiebreak = tiebreak;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A join onto the base relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: &'static str,
    pub alias: &'static str,
    /// Trusted ON condition.
    pub on: &'static str,
}

impl Join {
    pub const fn left(table: &'static str, alias: &'static str, on: &'static str) -> Self {
        Self {
            kind: JoinKind::Left,
            table,
            alias,
            on,
        }
    }
}

/// A selected output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub field: Field,
    pub alias: Option<&'static str>,
}

impl Selection {
    pub const fn col(field: Field) -> Self {
        Self { field, alias: None }
    }

    pub const fn aliased(field: Field, alias: &'static str) -> Self {
        Self {
            field,
            alias: Some(alias),
        }
    }
}

/// How the total is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counting {
    /// `COUNT(*)`
    Rows,
    /// `COUNT(DISTINCT field)`, for grouped relations.
    Distinct(Field),
}

/// Everything the engine needs to query one resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    /// Resource name used in logs and errors.
    pub name: &'static str,
    pub table: &'static str,
    pub alias: Option<&'static str>,
    pub joins: &'static [Join],
    pub columns: &'static [Selection],
    pub group_by: &'static [Field],
    pub counting: Counting,
    pub search: Option<SearchFields>,
    pub filters: &'static [FilterRule],
    pub sorts: &'static [SortKey],
    /// Ordering for empty/unknown tokens and the relevance fallback.
    pub fallback: &'static [OrderTerm],
    /// Identity column used for pinning, when the resource supports it.
    pub pin: Option<Field>,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl ResourceDescriptor {
    /// Look up the rule for a filter key.
    pub fn filter_rule(&self, key: &str) -> Option<&FilterRule> {
        self.filters.iter().find(|rule| rule.key == key)
    }

    /// Look up a sort key by token.
    pub fn sort_key(&self, token: &str) -> Option<&SortKey> {
        self.sorts.iter().find(|key| key.tokens.contains(&token))
    }

    /// Validate that every identifier in the table is well formed.
    ///
    /// Descriptors are static, so this is meant for tests.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !is_valid_identifier(self.table) {
            errors.push(format!("invalid table name: {}", self.table));
        }
        if let Some(alias) = self.alias
            && !is_valid_identifier(alias)
        {
            errors.push(format!("invalid table alias: {alias}"));
        }
        for join in self.joins {
            if !is_valid_identifier(join.table) || !is_valid_identifier(join.alias) {
                errors.push(format!("invalid join: {} {}", join.table, join.alias));
            }
        }
        if self.columns.is_empty() {
            errors.push("no columns selected".to_string());
        }
        for selection in self.columns {
            check_field(&selection.field, &mut errors);
        }
        for rule in self.filters {
            if !is_valid_identifier(rule.key) {
                errors.push(format!("invalid filter key: {}", rule.key));
            }
            for key in rule.suppressed_by {
                if self.filter_rule(key).is_none() {
                    errors.push(format!("{} suppressed by unknown key {key}", rule.key));
                }
            }
        }
        for (i, key) in self.sorts.iter().enumerate() {
            for token in key.tokens {
                if *token == "relevance" || token.is_empty() {
                    errors.push(format!("sort token '{token}' is reserved"));
                }
                if self.sorts[..i].iter().any(|k| k.tokens.contains(token)) {
                    errors.push(format!("duplicate sort token: {token}"));
                }
            }
            for term in key.primary.iter().chain(key.tiebreak) {
                check_field(&term.field, &mut errors);
            }
        }
        if self.fallback.is_empty() {
            errors.push("no fallback ordering".to_string());
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            errors.push(format!(
                "default limit {} outside [1, {}]",
                self.default_limit, self.max_limit
            ));
        }

        errors
    }
}

fn check_field(field: &Field, errors: &mut Vec<String>) {
    match field {
        Field::Column(col) if !is_valid_identifier(col) => {
            errors.push(format!("invalid column name: {col}"));
        }
        Field::Qualified(table, col)
            if !is_valid_identifier(table) || !is_valid_identifier(col) =>
        {
            errors.push(format!("invalid column name: {table}.{col}"));
        }
        _ => {}
    }
}

/// Alphanumeric/underscore, starting with a letter or underscore.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_sql_text() {
        assert_eq!(Field::Column("name").sql(), "name");
        assert_eq!(Field::Qualified("ctg", "name").sql(), "ctg.name");
        assert_eq!(Field::Raw("json_array_length(x)").sql(), "json_array_length(x)");
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("catalog_products"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("name; DROP TABLE x"));
        assert!(!is_valid_identifier("a.b"));
    }

    #[test]
    fn order_term_builders() {
        let term = OrderTerm::desc(Field::Column("time_start")).nulls_last();
        assert_eq!(term.direction, Direction::Desc);
        assert!(term.nulls_last);
        assert!(!OrderTerm::asc(Field::Column("name")).nulls_last);
    }
}
