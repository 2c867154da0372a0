//! Guided-selection wizards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, Join, OrderTerm, PredicateTemplate, ResourceDescriptor,
    SearchFields, Selection, SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const ID: Field = Field::Qualified("w", "id");
const NAME: Field = Field::Qualified("w", "name");
const EVENT_KIND: Field = Field::Qualified("ek", "name");
const BY_NAME: &[OrderTerm] = &[OrderTerm::asc(NAME)];

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "wizard",
    table: "wizards",
    alias: Some("w"),
    joins: &[Join::left("event_kinds", "ek", "w.event_kind_id = ek.id")],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(Field::Qualified("w", "description")),
        Selection::col(Field::Qualified("w", "event_kind_id")),
        Selection::aliased(EVENT_KIND, "event_kind"),
        Selection::col(Field::Qualified("w", "is_general")),
        Selection::col(Field::Qualified("w", "enabled")),
        Selection::col(Field::Qualified("w", "created_at")),
        Selection::col(Field::Qualified("w", "updated_at")),
    ],
    group_by: &[],
    counting: Counting::Rows,
    search: Some(SearchFields {
        vector: Some(Field::Qualified("w", "search_vector")),
        exact: &[NAME],
        fuzzy: &[NAME, EVENT_KIND],
        suppressed_by: &[],
    }),
    filters: &[
        FilterRule::new(
            "event_kind",
            PredicateTemplate::Equals(Field::Qualified("w", "event_kind_id"), ValueKind::Uuid),
        ),
        // An enabled wizard without steps cannot be shown.
        FilterRule::new(
            "enabled",
            PredicateTemplate::Flag {
                positive: concat!(
                    "(w.enabled = true AND EXISTS ",
                    "(SELECT 1 FROM wizard_steps_wizards wsw WHERE wsw.wizard_id = w.id))"
                ),
                negative: "w.enabled = false",
            },
        ),
    ],
    sorts: &[
        SortKey::new(&["name_asc", "name"], BY_NAME),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["eventkind_asc"], &[OrderTerm::asc(EVENT_KIND)]).then(BY_NAME),
        SortKey::new(&["eventkind_desc"], &[OrderTerm::desc(EVENT_KIND)]).then(BY_NAME),
        SortKey::new(&["newest"], &[OrderTerm::desc(ID)]),
        SortKey::new(&["oldest"], &[OrderTerm::asc(ID)]),
    ],
    fallback: &[OrderTerm::asc(NAME)],
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Wizard {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub event_kind_id: Option<Uuid>,
    pub event_kind: Option<String>,
    pub is_general: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Wizard {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::{FilterSpec, ResourceQuery};

    #[test]
    fn descriptor_is_valid() {
        assert!(DESCRIPTOR.validate().is_empty(), "{:?}", DESCRIPTOR.validate());
    }

    #[test]
    fn enabled_requires_steps() {
        let spec = FilterSpec::new().filter("enabled", 1i64);
        let (sql, values) = ResourceQuery::plan(&DESCRIPTOR, &spec, "spanish")
            .unwrap()
            .build_count();
        assert!(sql.contains("EXISTS (SELECT 1 FROM wizard_steps_wizards"), "sql: {sql}");
        assert!(values.0.is_empty());
    }

    #[test]
    fn disabled_does_not_look_at_steps() {
        let spec = FilterSpec::new().filter("enabled", false);
        let (sql, _) = ResourceQuery::plan(&DESCRIPTOR, &spec, "spanish")
            .unwrap()
            .build_count();
        assert!(sql.contains("w.enabled = false"), "sql: {sql}");
        assert!(!sql.contains("wizard_steps_wizards"), "sql: {sql}");
    }
}
