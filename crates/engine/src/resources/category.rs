//! Product categories with their product counts and images.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, Join, OrderTerm, PredicateTemplate, ResourceDescriptor,
    SearchFields, Selection, SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const ID: Field = Field::Qualified("ctg", "id");
const NAME: Field = Field::Qualified("ctg", "name");
const DESCRIPTION: Field = Field::Qualified("ctg", "description");
const PRODUCT_COUNT: Field = Field::Raw("COUNT(p.id)");

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "category",
    table: "categories",
    alias: Some("ctg"),
    joins: &[
        Join::left("products", "p", "ctg.id = p.category_id"),
        Join::left("images", "header", "header.id = ctg.header_img"),
        Join::left("images", "display", "display.id = ctg.display_img"),
    ],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(Field::Qualified("ctg", "slug")),
        Selection::col(DESCRIPTION),
        Selection::col(Field::Qualified("ctg", "long_description")),
        Selection::aliased(Field::Qualified("header", "filename"), "header_img"),
        Selection::aliased(Field::Qualified("header", "id"), "header_img_id"),
        Selection::aliased(Field::Qualified("display", "filename"), "display_img"),
        Selection::aliased(Field::Qualified("display", "id"), "display_img_id"),
        Selection::aliased(PRODUCT_COUNT, "product_count"),
        Selection::col(Field::Qualified("ctg", "qrcode_filename")),
    ],
    // Other ctg columns are functionally dependent on the key.
    group_by: &[
        ID,
        Field::Qualified("header", "filename"),
        Field::Qualified("header", "id"),
        Field::Qualified("display", "filename"),
        Field::Qualified("display", "id"),
    ],
    counting: Counting::Distinct(ID),
    search: Some(SearchFields {
        vector: Some(Field::Qualified("ctg", "search_vector")),
        exact: &[NAME, DESCRIPTION],
        fuzzy: &[NAME, DESCRIPTION],
        suppressed_by: &[],
    }),
    filters: &[FilterRule::new("ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid))],
    sorts: &[
        SortKey::new(&["name_asc", "name"], &[OrderTerm::asc(NAME)]),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["product_count_asc"], &[OrderTerm::asc(PRODUCT_COUNT)])
            .then(&[OrderTerm::asc(NAME)]),
        SortKey::new(&["product_count_desc"], &[OrderTerm::desc(PRODUCT_COUNT)])
            .then(&[OrderTerm::asc(NAME)]),
    ],
    fallback: &[OrderTerm::asc(NAME)],
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

/// A category listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub header_img: Option<String>,
    pub header_img_id: Option<Uuid>,
    pub display_img: Option<String>,
    pub display_img_id: Option<Uuid>,
    pub product_count: i64,
    pub qrcode_filename: Option<String>,
}

impl Resource for Category {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }
}
