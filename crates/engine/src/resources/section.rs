//! Content section listings over the `detailed_sections` view.
//!
//! The view aggregates paragraphs and services (with their items) into JSON
//! columns; count and price filters reach into that JSON.

use sqlx::FromRow;
use sqlx::postgres::PgRow;

use crate::aggregate::Section;
use crate::aggregate::store::decode_section;
use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, OrderTerm, PredicateTemplate, ResourceDescriptor, SearchFields,
    Selection, SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const ID: Field = Field::Column("id");
const NAME: Field = Field::Column("name");
const TITLE: Field = Field::Column("title");
const CREATED_AT: Field = Field::Column("created_at");
const UPDATED_AT: Field = Field::Column("updated_at");
const PARAGRAPHS: Field = Field::Column("paragraphs");
const SERVICES: Field = Field::Column("services");
const PARAGRAPH_COUNT: Field = Field::Raw("json_array_length(paragraphs)");
const SERVICE_COUNT: Field = Field::Raw("json_array_length(services)");

const TEXT_FIELDS: &[Field] = &[
    NAME,
    TITLE,
    Field::Raw("paragraphs::text"),
    Field::Raw("services::text"),
];

const BY_NAME: &[OrderTerm] = &[OrderTerm::asc(NAME)];
const TIMESTAMP: ValueKind = ValueKind::Timestamp;

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "section",
    table: "detailed_sections",
    alias: None,
    joins: &[],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(TITLE),
        Selection::col(Field::Column("image")),
        Selection::col(Field::Column("bg_image")),
        Selection::col(CREATED_AT),
        Selection::col(UPDATED_AT),
        Selection::col(PARAGRAPHS),
        Selection::col(SERVICES),
    ],
    group_by: &[],
    counting: Counting::Rows,
    search: Some(SearchFields {
        vector: Some(Field::Column("search_vector")),
        exact: TEXT_FIELDS,
        fuzzy: TEXT_FIELDS,
        suppressed_by: &[],
    }),
    filters: &[
        FilterRule::new("ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid)),
        FilterRule::new(
            "has_image",
            PredicateTemplate::Flag {
                positive: "(image IS NOT NULL AND image != '')",
                negative: "(image IS NULL OR image = '')",
            },
        ),
        FilterRule::new(
            "has_bg_image",
            PredicateTemplate::Flag {
                positive: "(bg_image IS NOT NULL AND bg_image != '')",
                negative: "(bg_image IS NULL OR bg_image = '')",
            },
        ),
        FilterRule::new(
            "paragraph_count",
            PredicateTemplate::Custom {
                sql: "json_array_length(paragraphs) >= $1",
                kind: ValueKind::Integer,
            },
        ),
        FilterRule::new(
            "service_count",
            PredicateTemplate::Custom {
                sql: "json_array_length(services) >= $1",
                kind: ValueKind::Integer,
            },
        ),
        FilterRule::new(
            "item_count",
            PredicateTemplate::Custom {
                sql: concat!(
                    "(SELECT COALESCE(SUM(json_array_length(svc->'items')), 0) ",
                    "FROM json_array_elements(services) AS svc) >= $1"
                ),
                kind: ValueKind::Integer,
            },
        ),
        // Prices are in cents.
        FilterRule::new(
            "min_price",
            PredicateTemplate::Custom {
                sql: concat!(
                    "EXISTS (SELECT 1 FROM json_array_elements(services) AS svc ",
                    "WHERE (svc->>'price')::int >= $1)"
                ),
                kind: ValueKind::Integer,
            },
        ),
        FilterRule::new(
            "max_price",
            PredicateTemplate::Custom {
                sql: concat!(
                    "EXISTS (SELECT 1 FROM json_array_elements(services) AS svc ",
                    "WHERE (svc->>'price')::int <= $1)"
                ),
                kind: ValueKind::Integer,
            },
        ),
        FilterRule::new("created_after", PredicateTemplate::AtLeast(CREATED_AT, TIMESTAMP)),
        FilterRule::new("created_before", PredicateTemplate::AtMost(CREATED_AT, TIMESTAMP)),
        FilterRule::new("updated_after", PredicateTemplate::AtLeast(UPDATED_AT, TIMESTAMP)),
        FilterRule::new("updated_before", PredicateTemplate::AtMost(UPDATED_AT, TIMESTAMP)),
    ],
    sorts: &[
        SortKey::new(&["name_asc", "name"], BY_NAME),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["title_asc"], &[OrderTerm::asc(TITLE)]),
        SortKey::new(&["title_desc"], &[OrderTerm::desc(TITLE)]),
        SortKey::new(&["created_asc"], &[OrderTerm::asc(CREATED_AT)]),
        SortKey::new(&["created_desc", "newest"], &[OrderTerm::desc(CREATED_AT)]),
        SortKey::new(&["updated_asc"], &[OrderTerm::asc(UPDATED_AT)]),
        SortKey::new(&["updated_desc", "recent"], &[OrderTerm::desc(UPDATED_AT)]),
        SortKey::new(&["paragraphs_asc"], &[OrderTerm::asc(PARAGRAPH_COUNT)]).then(BY_NAME),
        SortKey::new(&["paragraphs_desc"], &[OrderTerm::desc(PARAGRAPH_COUNT)]).then(BY_NAME),
        SortKey::new(&["services_asc"], &[OrderTerm::asc(SERVICE_COUNT)]).then(BY_NAME),
        SortKey::new(&["services_desc"], &[OrderTerm::desc(SERVICE_COUNT)]).then(BY_NAME),
    ],
    fallback: BY_NAME,
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

impl<'r> FromRow<'r, PgRow> for Section {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        decode_section(row)
    }
}

impl Resource for Section {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}
