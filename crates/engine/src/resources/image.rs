//! Uploaded media assets.
//!
//! The asset picker pins the current selection: pinned ids come back first,
//! flagged, in the order given, whatever the other filters say about ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, OrderTerm, PredicateTemplate, ResourceDescriptor, SearchFields,
    Selection, SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const NAME: Field = Field::Column("name");
const FILENAME: Field = Field::Column("filename");
const SIZE: Field = Field::Column("size");
const CREATED_AT: Field = Field::Column("created_at");

const TEXT_FIELDS: &[Field] = &[NAME, FILENAME];

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "image",
    table: "images",
    alias: None,
    joins: &[],
    columns: &[
        Selection::col(Field::Column("id")),
        Selection::col(FILENAME),
        Selection::col(NAME),
        Selection::col(Field::Column("no_optimize")),
        Selection::col(SIZE),
        Selection::col(CREATED_AT),
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
        FilterRule::new("exact_date", PredicateTemplate::SameDay(CREATED_AT)),
        FilterRule::new("date_after", PredicateTemplate::AtLeast(CREATED_AT, ValueKind::Timestamp))
            .suppressed_by(&["exact_date"]),
        FilterRule::new("date_before", PredicateTemplate::AtMost(CREATED_AT, ValueKind::Timestamp))
            .suppressed_by(&["exact_date"]),
    ],
    sorts: &[
        SortKey::new(&["name_asc"], &[OrderTerm::asc(NAME)]),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["filename_asc"], &[OrderTerm::asc(FILENAME)]),
        SortKey::new(&["filename_desc"], &[OrderTerm::desc(FILENAME)]),
        SortKey::new(&["size_asc"], &[OrderTerm::asc(SIZE)]),
        SortKey::new(&["size_desc"], &[OrderTerm::desc(SIZE)]),
        SortKey::new(&["created_asc", "oldest"], &[OrderTerm::asc(CREATED_AT)]),
        SortKey::new(&["created_desc", "newest"], &[OrderTerm::desc(CREATED_AT)]),
    ],
    fallback: &[OrderTerm::desc(CREATED_AT)],
    pin: Some(Field::Column("id")),
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: Uuid,
    pub filename: String,
    pub name: String,
    pub no_optimize: bool,
    pub size: i32,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
}

impl Resource for Image {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}
