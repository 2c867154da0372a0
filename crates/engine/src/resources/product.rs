//! Admin product listing over the `products` table.
//!
//! Unlike the storefront catalog this reads the base table, so it joins the
//! category, the main image and the gallery, and groups by product.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::query::Resource;
use crate::query::descriptor::{
    Counting, Field, FilterRule, Join, OrderTerm, PredicateTemplate, ResourceDescriptor,
    SearchFields, Selection, SortKey, ValueKind,
};
use crate::query::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

const ID: Field = Field::Qualified("prod", "id");
const NAME: Field = Field::Qualified("prod", "name");
const DESCRIPTION: Field = Field::Qualified("prod", "description");
const PRICE: Field = Field::Qualified("prod", "price");
const CATEGORY_ID: Field = Field::Qualified("prod", "category_id");
const CATEGORY_NAME: Field = Field::Qualified("ctg", "name");
const MAIN_IMG: Field = Field::Qualified("img", "filename");
const MAIN_IMG_ID: Field = Field::Qualified("img", "id");
const GALLERY: Field = Field::Raw(
    "COALESCE(ARRAY_AGG(imgs.filename) FILTER (WHERE imgs.filename IS NOT NULL), ARRAY[]::text[])",
);

const BY_NAME: &[OrderTerm] = &[OrderTerm::asc(NAME)];

pub static DESCRIPTOR: ResourceDescriptor = ResourceDescriptor {
    name: "product",
    table: "products",
    alias: Some("prod"),
    joins: &[
        Join::left("categories", "ctg", "prod.category_id = ctg.id"),
        Join::left("images_products", "imgs_prod", "imgs_prod.product_id = prod.id"),
        Join::left("images", "imgs", "imgs_prod.image_id = imgs.id"),
        Join::left("images", "img", "prod.main_img_id = img.id"),
    ],
    columns: &[
        Selection::col(ID),
        Selection::col(NAME),
        Selection::col(Field::Qualified("prod", "slug")),
        Selection::col(DESCRIPTION),
        Selection::col(Field::Qualified("prod", "long_description")),
        Selection::col(PRICE),
        Selection::col(Field::Qualified("prod", "unit")),
        Selection::col(Field::Qualified("prod", "quantity")),
        Selection::col(Field::Qualified("prod", "available")),
        Selection::col(Field::Qualified("prod", "qrcode_filename")),
        Selection::col(CATEGORY_ID),
        Selection::aliased(CATEGORY_NAME, "category"),
        Selection::aliased(MAIN_IMG, "main_img"),
        Selection::aliased(MAIN_IMG_ID, "main_img_id"),
        Selection::aliased(GALLERY, "gallery"),
    ],
    // Other prod columns are functionally dependent on the key.
    group_by: &[ID, CATEGORY_NAME, MAIN_IMG, MAIN_IMG_ID],
    counting: Counting::Distinct(ID),
    search: Some(SearchFields {
        vector: Some(Field::Qualified("prod", "search_vector")),
        exact: &[NAME, DESCRIPTION],
        fuzzy: &[NAME, DESCRIPTION, CATEGORY_NAME],
        suppressed_by: &[],
    }),
    filters: &[
        FilterRule::new("ids", PredicateTemplate::AnyOf(ID, ValueKind::Uuid)),
        FilterRule::new("category", PredicateTemplate::Equals(CATEGORY_ID, ValueKind::Uuid)),
        FilterRule::new(
            "available",
            PredicateTemplate::Flag {
                positive: "prod.available = true",
                negative: "prod.available = false",
            },
        ),
        FilterRule::new(
            "quantity",
            PredicateTemplate::Equals(Field::Qualified("prod", "quantity"), ValueKind::Integer),
        ),
        FilterRule::new(
            "with_qr_code",
            PredicateTemplate::Flag {
                positive: "(prod.qrcode_filename IS NOT NULL AND prod.qrcode_filename != '')",
                negative: "(prod.qrcode_filename IS NULL OR prod.qrcode_filename = '')",
            },
        ),
    ],
    sorts: &[
        SortKey::new(&["name_asc", "name"], BY_NAME),
        SortKey::new(&["name_desc"], &[OrderTerm::desc(NAME)]),
        SortKey::new(&["price_asc"], &[OrderTerm::asc(PRICE)]),
        SortKey::new(&["price_desc"], &[OrderTerm::desc(PRICE)]),
        SortKey::new(&["category"], &[OrderTerm::asc(CATEGORY_NAME)]).then(BY_NAME),
        // v7 identities sort by creation time.
        SortKey::new(&["newest"], &[OrderTerm::desc(ID)]),
        SortKey::new(&["oldest"], &[OrderTerm::asc(ID)]),
    ],
    fallback: BY_NAME,
    pin: None,
    default_limit: DEFAULT_LIMIT,
    max_limit: MAX_LIMIT,
};

/// A product row in the admin listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub long_description: String,
    pub price: f64,
    pub unit: String,
    pub quantity: i32,
    pub available: bool,
    pub qrcode_filename: Option<String>,
    pub category_id: Option<Uuid>,
    pub category: Option<String>,
    pub main_img: Option<String>,
    pub main_img_id: Option<Uuid>,
    pub gallery: Vec<String>,
}

impl<'r> FromRow<'r, PgRow> for Product {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let text = |col: &str| -> Result<String, sqlx::Error> {
            Ok(row.try_get::<Option<String>, _>(col)?.unwrap_or_default())
        };

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: text("slug")?,
            description: text("description")?,
            long_description: text("long_description")?,
            price: row.try_get::<Option<f64>, _>("price")?.unwrap_or(0.0),
            unit: text("unit")?,
            quantity: row.try_get::<Option<i32>, _>("quantity")?.unwrap_or(0),
            available: row.try_get::<Option<bool>, _>("available")?.unwrap_or(false),
            qrcode_filename: row.try_get("qrcode_filename")?,
            category_id: row.try_get("category_id")?,
            category: row.try_get("category")?,
            main_img: row.try_get("main_img")?,
            main_img_id: row.try_get("main_img_id")?,
            gallery: row.try_get::<Option<Vec<String>>, _>("gallery")?.unwrap_or_default(),
        })
    }
}

impl Resource for Product {
    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }

    fn correct(&mut self) {
        if self.long_description.trim().is_empty() {
            self.long_description.clone_from(&self.description);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::query::{FilterSpec, ResourceQuery, SearchMode};

    fn plan(spec: &FilterSpec) -> ResourceQuery<'static> {
        ResourceQuery::plan(&DESCRIPTOR, spec, "spanish").unwrap()
    }

    #[test]
    fn descriptor_is_valid() {
        assert!(DESCRIPTOR.validate().is_empty(), "{:?}", DESCRIPTOR.validate());
    }

    #[test]
    fn gallery_is_aggregated_per_product() {
        let (sql, _) = plan(&FilterSpec::new()).build_data();
        assert!(sql.contains("ARRAY_AGG(imgs.filename)"), "sql: {sql}");
        assert!(sql.contains(r#"GROUP BY "prod"."id""#), "sql: {sql}");

        let (count_sql, _) = plan(&FilterSpec::new()).build_count();
        assert!(count_sql.starts_with("SELECT COUNT(DISTINCT prod.id)"), "sql: {count_sql}");
    }

    #[test]
    fn admin_filters() {
        let category = Uuid::now_v7();
        let spec = FilterSpec::new()
            .filter("category", category.to_string())
            .filter("available", -1i64)
            .filter("with_qr_code", 1i64)
            .filter("quantity", 4i64);
        let (sql, values) = plan(&spec).build_count();
        assert!(sql.contains("prod.available = false"), "sql: {sql}");
        assert!(sql.contains("prod.qrcode_filename IS NOT NULL"), "sql: {sql}");
        assert_eq!(values.0[0], sea_query::Value::from(category));
        assert_eq!(values.0[1], sea_query::Value::from(4i64));
    }

    #[test]
    fn malformed_category_is_rejected() {
        let spec = FilterSpec::new().filter("category", "sillas");
        let err = ResourceQuery::plan(&DESCRIPTOR, &spec, "spanish").unwrap_err();
        assert!(matches!(err, EngineError::InvalidFilter { ref key, .. } if key == "category"));
    }

    #[test]
    fn price_sort_ranks_then_names() {
        let spec = FilterSpec::new()
            .search("mantel", SearchMode::FullText)
            .sort("price_desc");
        let (sql, _) = plan(&spec).build_data();
        assert!(
            sql.contains(r#"ORDER BY "prod"."price" DESC, "search_rank" DESC, "prod"."name" ASC"#),
            "sql: {sql}"
        );
    }

    #[test]
    fn long_description_falls_back() {
        let mut product = Product {
            id: Uuid::now_v7(),
            name: "Mantel".into(),
            slug: "mantel".into(),
            description: "Mantel redondo".into(),
            long_description: " ".into(),
            price: 120.0,
            unit: "pieza".into(),
            quantity: 3,
            available: true,
            qrcode_filename: None,
            category_id: None,
            category: None,
            main_img: None,
            main_img_id: None,
            gallery: Vec::new(),
        };
        product.correct();
        assert_eq!(product.long_description, "Mantel redondo");
    }
}
