//! Service requests (quotes). Not searchable; newest first by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, Join, OrderTerm, PredicateTemplate, ResourceDescriptor, Selection,
    SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const CREATED_AT: Field = Field::Qualified("q", "created_at");
const TIME_START: Field = Field::Qualified("q", "time_start");
const EVENT_KIND: Field = Field::Qualified("ek", "name");
// Enum columns are compared and returned as text.
const REQUEST_TYPE: Field = Field::Raw("q.request_type::text");
const STATUS: Field = Field::Raw("q.status::text");

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "quote",
    table: "quotes",
    alias: Some("q"),
    joins: &[Join::left("event_kinds", "ek", "q.event_kind_id = ek.id")],
    columns: &[
        Selection::col(Field::Qualified("q", "id")),
        Selection::col(Field::Qualified("q", "customer_name")),
        Selection::col(Field::Qualified("q", "customer_phone")),
        Selection::col(TIME_START),
        Selection::col(Field::Qualified("q", "time_end")),
        Selection::aliased(REQUEST_TYPE, "request_type"),
        Selection::aliased(STATUS, "status"),
        Selection::col(Field::Qualified("q", "comments")),
        Selection::col(Field::Qualified("q", "cart_id")),
        Selection::col(Field::Qualified("q", "event_kind_id")),
        Selection::aliased(EVENT_KIND, "event_kind_name"),
        Selection::col(CREATED_AT),
        Selection::col(Field::Qualified("q", "updated_at")),
    ],
    group_by: &[],
    counting: Counting::Rows,
    search: None,
    filters: &[
        FilterRule::new(
            "customer_name",
            PredicateTemplate::Contains(Field::Qualified("q", "customer_name")),
        ),
        FilterRule::new(
            "phone",
            PredicateTemplate::Contains(Field::Qualified("q", "customer_phone")),
        ),
        FilterRule::new(
            "created_from",
            PredicateTemplate::AtLeast(CREATED_AT, ValueKind::Timestamp),
        ),
        FilterRule::new("created_to", PredicateTemplate::AtMost(CREATED_AT, ValueKind::Timestamp)),
        FilterRule::new(
            "event_start_from",
            PredicateTemplate::AtLeast(TIME_START, ValueKind::Timestamp),
        ),
        FilterRule::new(
            "event_start_to",
            PredicateTemplate::AtMost(TIME_START, ValueKind::Timestamp),
        ),
        FilterRule::new("status", PredicateTemplate::Equals(STATUS, ValueKind::Text)),
        FilterRule::new("request_type", PredicateTemplate::Contains(REQUEST_TYPE)),
        FilterRule::new("comments", PredicateTemplate::Contains(Field::Qualified("q", "comments"))),
    ],
    sorts: &[
        SortKey::new(&["created_asc"], &[OrderTerm::asc(CREATED_AT)]),
        SortKey::new(&["created_desc"], &[OrderTerm::desc(CREATED_AT)]),
        SortKey::new(&["event_start_asc"], &[OrderTerm::asc(TIME_START).nulls_last()]),
        SortKey::new(&["event_start_desc"], &[OrderTerm::desc(TIME_START).nulls_last()]),
        SortKey::new(&["event_kind_asc"], &[OrderTerm::asc(EVENT_KIND).nulls_last()]),
        SortKey::new(&["event_kind_desc"], &[OrderTerm::desc(EVENT_KIND).nulls_last()]),
        SortKey::new(&["request_type_asc"], &[OrderTerm::asc(REQUEST_TYPE)]),
        SortKey::new(&["request_type_desc"], &[OrderTerm::desc(REQUEST_TYPE)]),
        SortKey::new(&["status_asc"], &[OrderTerm::asc(STATUS)]),
        SortKey::new(&["status_desc"], &[OrderTerm::desc(STATUS)]),
    ],
    fallback: &[OrderTerm::desc(CREATED_AT)],
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Quote {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub request_type: String,
    pub status: String,
    pub comments: Option<String>,
    pub cart_id: Option<Uuid>,
    pub event_kind_id: Option<Uuid>,
    pub event_kind_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Quote {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}
