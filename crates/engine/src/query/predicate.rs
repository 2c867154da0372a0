//! Filter compilation.
//!
//! A [`FilterSpec`] compiles against a [`ResourceDescriptor`] into an ordered
//! list of conditions plus the named values they bind. The search condition
//! comes first, then filters in descriptor order, so the same spec always
//! yields the same list. Both the count and the data statement are built from
//! one [`CompiledPredicates`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_query::{Expr, ExprTrait, SimpleExpr, Value};
use uuid::Uuid;

use super::descriptor::{FilterRule, PredicateTemplate, ResourceDescriptor, ValueKind};
use super::search::{SearchContext, escape_like_wildcards, ilike, strategy_for};
use super::types::{FilterSpec, FilterValue};
use crate::error::{EngineError, EngineResult};

/// A value bound by one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    One(Value),
    Many(Vec<Value>),
}

/// One compiled boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Filter key or search binding that produced it.
    pub key: String,
    pub expr: SimpleExpr,
}

/// Conditions, bindings and the optional relevance expression of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPredicates {
    pub conditions: Vec<Condition>,
    pub bindings: BTreeMap<String, Binding>,
    /// Full-text relevance, present only when a full-text term applies.
    pub rank: Option<SimpleExpr>,
}

impl CompiledPredicates {
    /// Whether relevance ordering is available.
    pub fn ranked(&self) -> bool {
        self.rank.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn push(&mut self, key: &str, expr: SimpleExpr, binding: Option<Binding>) {
        self.conditions.push(Condition {
            key: key.to_string(),
            expr,
        });
        if let Some(binding) = binding {
            self.bindings.insert(key.to_string(), binding);
        }
    }
}

/// Compile `spec` against `descriptor`.
///
/// Keys the descriptor does not declare are ignored with a warning. A value
/// that cannot be coerced to its field's type is an `InvalidFilter` error.
pub fn compile(
    descriptor: &ResourceDescriptor,
    spec: &FilterSpec,
    language: &str,
) -> EngineResult<CompiledPredicates> {
    let mut compiled = CompiledPredicates::default();

    for key in spec.filters.keys() {
        if descriptor.filter_rule(key).is_none() {
            tracing::warn!(resource = descriptor.name, key = %key, "ignoring unknown filter key");
        }
    }

    if let Some(term) = spec.search_term() {
        match &descriptor.search {
            Some(fields) if !suppressed(fields.suppressed_by, spec) => {
                let ctx = SearchContext { fields, language };
                let strategy = strategy_for(spec.search_mode);
                if let Some(fragment) = strategy.fragment(&ctx, term) {
                    compiled.rank = strategy.rank(&ctx, term);
                    compiled.push(
                        fragment.binding,
                        fragment.predicate,
                        Some(Binding::One(fragment.value.into())),
                    );
                } else {
                    tracing::debug!(
                        resource = descriptor.name,
                        mode = ?spec.search_mode,
                        "search mode has no columns, term ignored"
                    );
                }
            }
            Some(_) => {
                tracing::debug!(resource = descriptor.name, "search term suppressed by filter");
            }
            None => {
                tracing::debug!(
                    resource = descriptor.name,
                    "resource is not searchable, term ignored"
                );
            }
        }
    }

    for rule in descriptor.filters {
        let Some(value) = spec.value(rule.key) else {
            continue;
        };
        if suppressed(rule.suppressed_by, spec) {
            continue;
        }
        if let Some((expr, binding)) = compile_rule(rule, value)? {
            compiled.push(rule.key, expr, binding);
        }
    }

    tracing::debug!(
        resource = descriptor.name,
        conditions = compiled.conditions.len(),
        ranked = compiled.ranked(),
        "compiled predicates"
    );

    Ok(compiled)
}

fn suppressed(by: &[&str], spec: &FilterSpec) -> bool {
    by.iter().any(|key| spec.value(key).is_some())
}

/// Which end of a day a date-only input stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayBound {
    Start,
    End,
}

type Compiled = Option<(SimpleExpr, Option<Binding>)>;

fn compile_rule(rule: &FilterRule, value: &FilterValue) -> EngineResult<Compiled> {
    let key = rule.key;
    let compiled = match rule.template {
        PredicateTemplate::Equals(field, kind) => {
            let v = coerce_one(key, value, kind, DayBound::Start)?;
            Some((field.expr().eq(v.clone()), Some(Binding::One(v))))
        }
        PredicateTemplate::AnyOf(field, kind) => {
            let values = coerce_many(key, value, kind)?;
            if values.is_empty() {
                return Ok(None);
            }
            Some((
                field.expr().is_in(values.clone()),
                Some(Binding::Many(values)),
            ))
        }
        PredicateTemplate::NoneOf(field, kind) => {
            let values = coerce_many(key, value, kind)?;
            if values.is_empty() {
                return Ok(None);
            }
            Some((
                field.expr().is_not_in(values.clone()),
                Some(Binding::Many(values)),
            ))
        }
        PredicateTemplate::AtLeast(field, kind) => {
            let v = coerce_one(key, value, kind, DayBound::Start)?;
            Some((field.expr().gte(v.clone()), Some(Binding::One(v))))
        }
        PredicateTemplate::AtMost(field, kind) => {
            let v = coerce_one(key, value, kind, DayBound::End)?;
            Some((field.expr().lte(v.clone()), Some(Binding::One(v))))
        }
        PredicateTemplate::Contains(field) => {
            let text = text_of(key, value)?;
            let pattern = format!("%{}%", escape_like_wildcards(&text));
            Some((ilike(&field, &pattern), Some(Binding::One(pattern.into()))))
        }
        PredicateTemplate::Flag { positive, negative } => {
            let state = value
                .as_tri_state()
                .ok_or_else(|| EngineError::invalid_filter(key, "expected a tri-state value"))?;
            match state {
                s if s > 0 => Some((Expr::cust(positive), None)),
                s if s < 0 => Some((Expr::cust(negative), None)),
                _ => None,
            }
        }
        PredicateTemplate::SameDay(field) => {
            let v = coerce_one(key, value, ValueKind::Timestamp, DayBound::Start)?;
            let sql = format!("DATE({}) = DATE($1)", field.sql());
            Some((Expr::cust_with_values(sql, [v.clone()]), Some(Binding::One(v))))
        }
        PredicateTemplate::Custom { sql, kind } => {
            let v = coerce_one(key, value, kind, DayBound::Start)?;
            Some((Expr::cust_with_values(sql, [v.clone()]), Some(Binding::One(v))))
        }
    };
    Ok(compiled)
}

fn text_of(key: &str, value: &FilterValue) -> EngineResult<String> {
    value
        .as_text()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::invalid_filter(key, "expected a single value"))
}

fn coerce_one(
    key: &str,
    value: &FilterValue,
    kind: ValueKind,
    bound: DayBound,
) -> EngineResult<Value> {
    match kind {
        ValueKind::Integer => value
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| EngineError::invalid_filter(key, "expected an integer")),
        _ => coerce_text(key, &text_of(key, value)?, kind, bound),
    }
}

fn coerce_many(key: &str, value: &FilterValue, kind: ValueKind) -> EngineResult<Vec<Value>> {
    if let (ValueKind::Integer, FilterValue::Integer(n)) = (kind, value) {
        return Ok(vec![Value::from(*n)]);
    }
    value
        .as_list()
        .iter()
        .map(|item| coerce_text(key, item, kind, DayBound::Start))
        .collect()
}

fn coerce_text(key: &str, raw: &str, kind: ValueKind, bound: DayBound) -> EngineResult<Value> {
    match kind {
        ValueKind::Text => Ok(Value::from(raw.to_string())),
        ValueKind::Uuid => Uuid::parse_str(raw)
            .map(Value::from)
            .map_err(|_| EngineError::invalid_filter(key, "expected a UUID")),
        ValueKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| EngineError::invalid_filter(key, "expected an integer")),
        ValueKind::Timestamp => parse_timestamp(raw, bound)
            .map(Value::from)
            .ok_or_else(|| {
                EngineError::invalid_filter(
                    key,
                    "expected an RFC 3339 timestamp or YYYY-MM-DD date",
                )
            }),
    }
}

/// RFC 3339 timestamps pass through; bare dates expand to the start or end
/// of that day in UTC.
fn parse_timestamp(raw: &str, bound: DayBound) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let naive = match bound {
        DayBound::Start => date.and_hms_opt(0, 0, 0)?,
        DayBound::End => date.and_hms_micro_opt(23, 59, 59, 999_999)?,
    };
    Some(naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::descriptor::{Counting, Field, OrderTerm, SearchFields, Selection};
    use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};
    use crate::query::types::SearchMode;
    use sea_query::{PostgresQueryBuilder, Query};

    const ID: Field = Field::Column("id");
    const NAME: Field = Field::Column("name");
    const QUANTITY: Field = Field::Column("quantity");

    const RULES: &[FilterRule] = &[
        FilterRule::new(
            "categories",
            PredicateTemplate::AnyOf(Field::Column("category_id"), ValueKind::Uuid),
        )
        .suppressed_by(&["only_ids"]),
        FilterRule::new(
            "available",
            PredicateTemplate::Flag {
                positive: "available = true",
                negative: "available = false",
            },
        )
        .suppressed_by(&["only_ids"]),
        FilterRule::new("min_quantity", PredicateTemplate::AtLeast(QUANTITY, ValueKind::Integer))
            .suppressed_by(&["only_ids"]),
        FilterRule::new("max_quantity", PredicateTemplate::AtMost(QUANTITY, ValueKind::Integer))
            .suppressed_by(&["only_ids"]),
        FilterRule::new(
            "created_before",
            PredicateTemplate::AtMost(Field::Column("created_at"), ValueKind::Timestamp),
        ),
        FilterRule::new("comments", PredicateTemplate::Contains(Field::Column("comments"))),
        FilterRule::new("exclude_ids", PredicateTemplate::NoneOf(ID, ValueKind::Uuid)),
        FilterRule::new("only_ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid)),
    ];

    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
        name: "widget",
        table: "widgets",
        alias: None,
        joins: &[],
        columns: &[Selection::col(NAME)],
        group_by: &[],
        counting: Counting::Rows,
        search: Some(SearchFields {
            vector: Some(Field::Column("search_vector")),
            exact: &[NAME],
            fuzzy: &[NAME],
            suppressed_by: &["only_ids"],
        }),
        filters: RULES,
        sorts: &[],
        fallback: &[OrderTerm::asc(NAME)],
        pin: None,
        default_limit: DEFAULT_LIMIT,
        max_limit: MAX_LIMIT,
    };

    fn render(compiled: &CompiledPredicates) -> (String, usize) {
        let mut query = Query::select();
        query.expr(Expr::cust("1"));
        for condition in &compiled.conditions {
            query.and_where(condition.expr.clone());
        }
        let (sql, values) = query.build(PostgresQueryBuilder);
        (sql, values.0.len())
    }

    fn keys(compiled: &CompiledPredicates) -> Vec<&str> {
        compiled.conditions.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn empty_spec_compiles_to_nothing() {
        let compiled = compile(&DESCRIPTOR, &FilterSpec::new(), "spanish").unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.bindings.is_empty());
        assert!(!compiled.ranked());
    }

    #[test]
    fn empty_values_contribute_no_condition() {
        let spec = FilterSpec::new()
            .filter("comments", "  ")
            .filter("categories", Vec::<String>::new());
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert!(compiled.is_empty());
    }

    #[test]
    fn search_comes_first_then_descriptor_order() {
        let spec = FilterSpec::new()
            .search("mesa", SearchMode::FullText)
            .filter("max_quantity", 10i64)
            .filter("min_quantity", 2i64);
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert_eq!(keys(&compiled), ["search_query", "min_quantity", "max_quantity"]);
        assert!(compiled.ranked());
    }

    #[test]
    fn range_bounds_are_independent() {
        let spec = FilterSpec::new().filter("min_quantity", 0i64);
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        let (sql, bound) = render(&compiled);
        assert!(sql.contains(r#""quantity" >= $1"#), "sql: {sql}");
        assert!(!sql.contains("<="), "sql: {sql}");
        assert_eq!(bound, 1);
    }

    #[test]
    fn include_and_exclude_sets() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let spec = FilterSpec::new()
            .filter("categories", vec![a, b])
            .filter("exclude_ids", vec![a]);
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        let (sql, bound) = render(&compiled);
        assert!(sql.contains(r#""category_id" IN ($1, $2)"#), "sql: {sql}");
        assert!(sql.contains(r#""id" NOT IN ($3)"#), "sql: {sql}");
        assert_eq!(bound, 3);
        assert_eq!(
            compiled.bindings.get("categories"),
            Some(&Binding::Many(vec![Value::from(a), Value::from(b)]))
        );
    }

    #[test]
    fn invalid_uuid_is_rejected() {
        let spec = FilterSpec::new().filter("categories", "not-a-uuid");
        let err = compile(&DESCRIPTOR, &spec, "spanish").unwrap_err();
        assert!(matches!(err, EngineError::InvalidFilter { ref key, .. } if key == "categories"));
    }

    #[test]
    fn tri_state_zero_adds_nothing() {
        let spec = FilterSpec::new().filter("available", 0i64);
        let zero = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert!(zero.is_empty());

        let spec = FilterSpec::new().filter("available", -1i64);
        let negative = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        let (sql, bound) = render(&negative);
        assert!(sql.contains("available = false"), "sql: {sql}");
        assert_eq!(bound, 0);
    }

    #[test]
    fn only_ids_overrides_everything_but_exclusions() {
        let id = Uuid::now_v7();
        let spec = FilterSpec::new()
            .search("mesa", SearchMode::Fuzzy)
            .filter("available", true)
            .filter("min_quantity", 1i64)
            .filter("exclude_ids", vec![Uuid::now_v7()])
            .filter("only_ids", vec![id]);
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert_eq!(keys(&compiled), ["exclude_ids", "only_ids"]);
    }

    #[test]
    fn unknown_keys_never_reach_sql() {
        let spec = FilterSpec::new().filter("name; DROP TABLE widgets", "x");
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert!(compiled.is_empty());
    }

    #[test]
    fn substring_value_is_bound_and_escaped() {
        let spec = FilterSpec::new().filter("comments", "100%");
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        let (sql, _) = render(&compiled);
        assert!(sql.contains("comments ILIKE $1"), "sql: {sql}");
        assert_eq!(
            compiled.bindings.get("comments"),
            Some(&Binding::One(Value::from("%100\\%%".to_string())))
        );
    }

    #[test]
    fn date_upper_bound_is_end_of_day() {
        let ts = parse_timestamp("2024-05-01", DayBound::End).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T23:59:59.999999+00:00");
        let ts = parse_timestamp("2024-05-01", DayBound::Start).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        let ts = parse_timestamp("2024-05-01T10:30:00+02:00", DayBound::End).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T08:30:00+00:00");
        assert!(parse_timestamp("yesterday", DayBound::Start).is_none());
    }

    #[test]
    fn exact_mode_does_not_rank() {
        let spec = FilterSpec::new().search("mesa", SearchMode::Exact);
        let compiled = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        assert_eq!(keys(&compiled), ["exact_search"]);
        assert!(!compiled.ranked());
    }

    #[test]
    fn identical_specs_compile_identically() {
        let spec = FilterSpec::new()
            .search("silla", SearchMode::FullText)
            .filter("comments", "urgente")
            .filter("created_before", "2024-01-31")
            .filter("min_quantity", 3i64);
        let first = compile(&DESCRIPTOR, &spec, "spanish").unwrap();
        let second = compile(&DESCRIPTOR, &spec.clone(), "spanish").unwrap();
        assert_eq!(first, second);
        assert_eq!(render(&first), render(&second));
    }
}
