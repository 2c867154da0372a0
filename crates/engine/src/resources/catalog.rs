//! Catalog products, read through the `catalog_products` view.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::query::descriptor::{
    Counting, Field, FilterRule, OrderTerm, PredicateTemplate, ResourceDescriptor, SearchFields,
    Selection, SortKey, ValueKind,
};
use crate::query::pagination::MAX_LIMIT;
use crate::query::Resource;

/// Catalog pages show four rows of four.
pub const CATALOG_PAGE_SIZE: u32 = 16;

const ID: Field = Field::Column("id");
const NAME: Field = Field::Column("name");
const QUANTITY: Field = Field::Column("quantity");
const CATEGORY_NAME: Field = Field::Column("category_name");
const AVAILABLE: Field = Field::Column("available");
const BY_NAME: &[OrderTerm] = &[OrderTerm::asc(NAME)];

/// `only_ids` overrides everything except `exclude_ids`.
const OVERRIDDEN: &[&str] = &["only_ids"];

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "catalog_product",
    table: "catalog_products",
    alias: None,
    joins: &[],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(Field::Column("slug")),
        Selection::col(Field::Column("description")),
        Selection::col(Field::Column("long_description")),
        Selection::col(Field::Column("category_id")),
        Selection::col(CATEGORY_NAME),
        Selection::col(Field::Column("image_url")),
        Selection::col(Field::Column("images")),
        Selection::col(AVAILABLE),
        Selection::col(QUANTITY),
    ],
    group_by: &[],
    counting: Counting::Rows,
    search: Some(SearchFields {
        vector: Some(Field::Column("search_vector")),
        exact: &[NAME, Field::Column("description")],
        fuzzy: &[NAME, Field::Column("description"), CATEGORY_NAME],
        suppressed_by: OVERRIDDEN,
    }),
    filters: &[
        FilterRule::new(
            "categories",
            PredicateTemplate::AnyOf(Field::Column("category_id"), ValueKind::Uuid),
        )
        .suppressed_by(OVERRIDDEN),
        FilterRule::new(
            "available",
            PredicateTemplate::Flag {
                positive: "available = true",
                negative: "available = false",
            },
        )
        .suppressed_by(OVERRIDDEN),
        FilterRule::new(
            "min_quantity",
            PredicateTemplate::AtLeast(QUANTITY, ValueKind::Integer),
        )
        .suppressed_by(OVERRIDDEN),
        FilterRule::new(
            "max_quantity",
            PredicateTemplate::AtMost(QUANTITY, ValueKind::Integer),
        )
        .suppressed_by(OVERRIDDEN),
        FilterRule::new("exclude_ids", PredicateTemplate::NoneOf(ID, ValueKind::Uuid)),
        FilterRule::new("only_ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid)),
    ],
    sorts: &[
        SortKey::new(&["name_asc", "name"], BY_NAME),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["quantity_asc"], &[OrderTerm::asc(QUANTITY)]).then(BY_NAME),
        SortKey::new(&["quantity_desc"], &[OrderTerm::desc(QUANTITY)]).then(BY_NAME),
        SortKey::new(&["category_asc"], &[OrderTerm::asc(CATEGORY_NAME)]).then(BY_NAME),
        SortKey::new(&["category_desc"], &[OrderTerm::desc(CATEGORY_NAME)]).then(BY_NAME),
        SortKey::new(&["available_first"], &[OrderTerm::desc(AVAILABLE)]).then(BY_NAME),
        SortKey::new(&["available_last"], &[OrderTerm::asc(AVAILABLE)]).then(BY_NAME),
        // v7 identities sort by creation time.
        SortKey::new(&["newest"], &[OrderTerm::desc(ID)]),
        SortKey::new(&["oldest"], &[OrderTerm::asc(ID)]),
    ],
    fallback: &[OrderTerm::asc(NAME)],
    pin: None,
    default_limit: CATALOG_PAGE_SIZE,
    max_limit: MAX_LIMIT,
};

/// A product as shown in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub long_description: String,
    pub category_id: Option<Uuid>,
    #[serde(rename = "category")]
    pub category_name: Option<String>,
    pub image_url: Option<String>,
    pub images: Vec<String>,
    pub available: bool,
    pub quantity: i32,
}

impl<'r> FromRow<'r, PgRow> for CatalogProduct {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let description: Option<String> = row.try_get("description")?;
        let long_description: Option<String> = row.try_get("long_description")?;
        let images: Option<Json<Vec<String>>> = row.try_get("images")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get::<Option<String>, _>("slug")?.unwrap_or_default(),
            description: description.unwrap_or_default(),
            long_description: long_description.unwrap_or_default(),
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            image_url: row.try_get("image_url")?,
            images: images.map(|Json(images)| images).unwrap_or_default(),
            available: row.try_get::<Option<bool>, _>("available")?.unwrap_or(false),
            quantity: row.try_get::<Option<i32>, _>("quantity")?.unwrap_or(0),
        })
    }
}

impl Resource for CatalogProduct {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }

    fn correct(&mut self) {
        // Stock wins over the stored flag.
        if self.quantity <= 0 {
            self.available = false;
        }
        if self.long_description.trim().is_empty() {
            self.long_description.clone_from(&self.description);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::{FilterSpec, ResourceQuery, SearchMode};

    fn product(quantity: i32, available: bool) -> CatalogProduct {
        CatalogProduct {
            id: Uuid::now_v7(),
            name: "Silla Tiffany".to_string(),
            slug: "silla-tiffany".to_string(),
            description: "Silla para eventos".to_string(),
            long_description: String::new(),
            category_id: None,
            category_name: Some("Sillas".to_string()),
            image_url: None,
            images: Vec::new(),
            available,
            quantity,
        }
    }

    #[test]
    fn descriptor_is_valid() {
        assert!(DESCRIPTOR.validate().is_empty(), "{:?}", DESCRIPTOR.validate());
    }

    #[test]
    fn out_of_stock_is_unavailable() {
        let mut p = product(0, true);
        p.correct();
        assert!(!p.available);

        let mut p = product(-3, true);
        p.correct();
        assert!(!p.available);
    }

    #[test]
    fn in_stock_keeps_stored_flag() {
        let mut p = product(5, false);
        p.correct();
        assert!(!p.available, "stock never forces availability on");

        let mut p = product(5, true);
        p.correct();
        assert!(p.available);
    }

    #[test]
    fn long_description_falls_back() {
        let mut p = product(1, true);
        p.correct();
        assert_eq!(p.long_description, "Silla para eventos");
    }

    #[test]
    fn default_page_size() {
        let query = ResourceQuery::plan(&DESCRIPTOR, &FilterSpec::new(), "spanish").unwrap();
        assert_eq!(query.pagination().limit, CATALOG_PAGE_SIZE);
    }

    #[test]
    fn fuzzy_search_covers_category_name() {
        let spec = FilterSpec::new().search("sill", SearchMode::Fuzzy);
        let (sql, _) = ResourceQuery::plan(&DESCRIPTOR, &spec, "spanish")
            .unwrap()
            .build_count();
        assert!(sql.contains("category_name ILIKE"), "sql: {sql}");
    }

    #[test]
    fn serialized_category_key() {
        let json = serde_json::to_value(product(1, true)).unwrap();
        assert_eq!(json["category"], "Sillas");
    }
}
