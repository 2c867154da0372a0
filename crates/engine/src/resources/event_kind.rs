//! Event kinds. No search vector: every search mode is a substring match on
//! name and description.

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

const ID: Field = Field::Column("id");
const NAME: Field = Field::Column("name");
const CREATED_AT: Field = Field::Column("created_at");
const TEXT_FIELDS: &[Field] = &[NAME, Field::Column("description")];

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "event_kind",
    table: "event_kinds",
    alias: None,
    joins: &[],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(Field::Column("description")),
        Selection::col(CREATED_AT),
        Selection::col(Field::Column("updated_at")),
    ],
    group_by: &[],
    counting: Counting::Rows,
    search: Some(SearchFields {
        vector: None,
        exact: TEXT_FIELDS,
        fuzzy: TEXT_FIELDS,
        suppressed_by: &[],
    }),
    filters: &[FilterRule::new("ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid))],
    sorts: &[
        SortKey::new(&["name_asc", "name"], &[OrderTerm::asc(NAME)]),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["created_asc", "oldest"], &[OrderTerm::asc(CREATED_AT)]),
        SortKey::new(&["created_desc", "newest"], &[OrderTerm::desc(CREATED_AT)]),
    ],
    fallback: &[OrderTerm::asc(NAME)],
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventKind {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for EventKind {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}
