#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Listing behavior across the shipped resources, checked on rendered SQL.

use vitrine_engine::query::builder::ResourceQuery;
use vitrine_engine::query::order::OrderClause;
use vitrine_engine::query::{FilterSpec, Pagination, ResourceDescriptor, ResultPage, SearchMode};
use vitrine_engine::resources::{self, catalog, section, wizard};

fn plan(descriptor: &'static ResourceDescriptor, spec: &FilterSpec) -> ResourceQuery<'static> {
    ResourceQuery::plan(descriptor, spec, "spanish").unwrap()
}

fn where_clause(sql: &str) -> &str {
    let start = sql.find(" WHERE ").expect("no WHERE clause");
    let rest = &sql[start..];
    let end = [" GROUP BY ", " ORDER BY ", " LIMIT "]
        .iter()
        .filter_map(|kw| rest.find(kw))
        .min()
        .unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn every_descriptor_is_valid() {
    for descriptor in resources::descriptors() {
        assert!(
            descriptor.validate().is_empty(),
            "{}: {:?}",
            descriptor.name,
            descriptor.validate()
        );
    }
}

#[test]
fn count_and_data_share_conditions() {
    let spec = FilterSpec::new()
        .search("mantel", SearchMode::FullText)
        .filter("available", 1i64)
        .filter("min_quantity", 2i64)
        .filter(
            "categories",
            "0190a6a4-0000-7000-8000-000000000001,0190a6a4-0000-7000-8000-000000000002",
        )
        .page(2);
    let query = plan(&catalog::DESCRIPTOR, &spec);

    let (count_sql, count_values) = query.build_count();
    let (data_sql, data_values) = query.build_data();

    // The rank expression binds the term ahead of the WHERE values.
    let rank_binds = 1;
    let shift = |sql: &str| -> String {
        let mut out = sql.to_string();
        for n in (1..=count_values.0.len()).rev() {
            out = out.replace(&format!("${n}"), &format!("${}", n + rank_binds));
        }
        out
    };
    assert_eq!(shift(where_clause(&count_sql)), where_clause(&data_sql));
    assert_eq!(
        count_values.0,
        data_values.0[rank_binds..rank_binds + count_values.0.len()]
    );
}

#[test]
fn relevance_without_ranking_falls_back_to_name() {
    for mode in [SearchMode::Exact, SearchMode::Fuzzy] {
        let spec = FilterSpec::new().search("mesa", mode).sort("relevance");
        let query = plan(&catalog::DESCRIPTOR, &spec);
        assert!(!query.predicates().ranked());
        let (sql, _) = query.build_data();
        assert!(sql.contains(r#"ORDER BY "name" ASC"#), "sql: {sql}");
        assert!(!sql.contains("search_rank"), "sql: {sql}");
    }

    // Empty term with full text: nothing to rank either.
    let query = plan(&catalog::DESCRIPTOR, &FilterSpec::new().sort("relevance"));
    assert!(!query.predicates().ranked());
}

#[test]
fn full_text_ranks_first_then_name() {
    let spec = FilterSpec::new().search("mesa redonda", SearchMode::FullText);
    let query = plan(&wizard::DESCRIPTOR, &spec);
    assert_eq!(query.ordering()[0], OrderClause::Relevance);
    let (sql, _) = query.build_data();
    assert!(sql.contains(r#"ORDER BY "search_rank" DESC, "w"."name" ASC"#), "sql: {sql}");
}

#[test]
fn client_sort_text_never_reaches_sql() {
    let spec = FilterSpec::new().sort("name; DROP TABLE sections");
    let (sql, _) = plan(&section::DESCRIPTOR, &spec).build_data();
    assert!(!sql.contains("DROP"), "sql: {sql}");
    assert!(sql.contains(r#"ORDER BY "name" ASC"#), "sql: {sql}");
}

#[test]
fn client_filter_values_are_bound() {
    let spec = FilterSpec::new().search("'; DELETE FROM carts; --", SearchMode::Fuzzy);
    let (sql, values) = plan(&section::DESCRIPTOR, &spec).build_count();
    assert!(!sql.contains("DELETE"), "sql: {sql}");
    assert!(!values.0.is_empty());
}

#[test]
fn unknown_filter_keys_are_ignored() {
    let spec = FilterSpec::new().filter("1=1 OR", "x").filter("color", "rojo");
    let query = plan(&catalog::DESCRIPTOR, &spec);
    assert!(query.predicates().is_empty());
    let (sql, values) = query.build_count();
    assert!(!sql.contains("WHERE"), "sql: {sql}");
    assert!(values.0.is_empty());
}

#[test]
fn limit_is_clamped_and_offset_derived() {
    let query = plan(&section::DESCRIPTOR, &FilterSpec::new().page(3).limit(1_000));
    assert_eq!(query.pagination(), Pagination { page: 3, limit: 100 });
    let (sql, values) = query.build_data();
    assert!(sql.ends_with("LIMIT $1 OFFSET $2"), "sql: {sql}");
    assert_eq!(values.0, vec![sea_query::Value::from(100u64), sea_query::Value::from(200u64)]);

    let query = plan(&section::DESCRIPTOR, &FilterSpec::new().page(0).limit(-4));
    assert_eq!(query.pagination(), Pagination { page: 1, limit: 20 });
}

#[test]
fn page_metadata() {
    let first = Pagination::normalize(Some(1), Some(2), 20, 100);
    let page: ResultPage<u8> = ResultPage::new(vec![1, 2], 5, &first);
    assert_eq!(page.total_pages, 3);
    assert!(page.has_next);
    assert!(!page.has_previous);

    let last = Pagination::normalize(Some(3), Some(2), 20, 100);
    let page: ResultPage<u8> = ResultPage::new(vec![5], 5, &last);
    assert!(!page.has_next);
    assert!(page.has_previous);

    let empty: ResultPage<u8> = ResultPage::empty(&first);
    assert_eq!(empty.total_pages, 0);
    assert!(!empty.has_next);
}

#[test]
fn page_length_matches_total_and_offset() {
    let cases = [(1, 2, 5, 2), (3, 2, 5, 1), (4, 2, 5, 0), (1, 20, 0, 0)];
    for (page, limit, total, expected) in cases {
        let pagination = Pagination::normalize(Some(page), Some(limit), 20, 100);
        assert_eq!(
            pagination.expected_len(total),
            expected,
            "page {page} limit {limit} total {total}"
        );
    }
}

#[test]
fn result_page_field_names_are_stable() {
    let pagination = Pagination::normalize(None, None, 20, 100);
    let json = serde_json::to_value(ResultPage::new(vec!["a"], 1, &pagination)).unwrap();
    for key in ["items", "total", "page", "limit", "total_pages", "has_next", "has_previous"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn identical_specs_compile_identically() {
    let spec = FilterSpec::new()
        .search("boda", SearchMode::Fuzzy)
        .filter("has_image", 1i64)
        .filter("created_after", "2024-01-01")
        .sort("updated_desc");
    let a = plan(&section::DESCRIPTOR, &spec).build_data();
    let b = plan(&section::DESCRIPTOR, &spec.clone()).build_data();
    assert_eq!(a, b);
}
