//! Cart persistence.

use chrono::{DateTime, Utc};
use sea_query::{Alias, OnConflict, PostgresQueryBuilder, Query, SimpleExpr, Value};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{Cart, CartField, CartLine, LineSource};
use crate::config::Config;
use crate::db;
use crate::error::{EngineError, EngineResult, StoreContext};

const RESOURCE: &str = "cart";

#[derive(FromRow)]
struct CartRow {
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    created_at: DateTime<Utc>,
    is_submitted: bool,
}

#[derive(FromRow)]
struct LineRow {
    product_id: Uuid,
    quantity: i32,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    name: String,
    category_name: Option<String>,
    image_url: Option<String>,
    max_quantity: i32,
}

impl From<LineRow> for CartLine {
    fn from(row: LineRow) -> Self {
        let source = LineSource::from_label(&row.source).unwrap_or_else(|| {
            tracing::warn!(product = %row.product_id, source = %row.source, "unknown line source");
            LineSource::Catalog
        });
        Self {
            product_id: row.product_id,
            name: row.name,
            category: row.category_name,
            image_url: row.image_url,
            quantity: row.quantity,
            max_quantity: row.max_quantity,
            source,
            step_index: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Cart store.
#[derive(Clone)]
pub struct CartStore {
    pool: PgPool,
    config: Config,
}

impl CartStore {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self { pool, config }
    }

    /// Load a cart and its lines. Line details come from the catalog.
    pub async fn find(&self, id: Uuid) -> EngineResult<Cart> {
        let mut tx = db::begin_bounded(&self.pool, self.config.read_timeout, RESOURCE).await?;

        let row: Option<CartRow> = sqlx::query_as(
            r#"
            SELECT customer_name, customer_email, customer_phone, created_at, is_submitted
            FROM carts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .store_context(RESOURCE, "find")?;

        let Some(row) = row else {
            return Err(EngineError::NotFound { resource: RESOURCE });
        };
        let lines = load_lines(&mut *tx, id).await?;
        tx.commit().await.store_context(RESOURCE, "commit")?;

        Ok(Cart::stored(
            id,
            row.customer_name.unwrap_or_default(),
            row.customer_email.unwrap_or_default(),
            row.customer_phone.unwrap_or_default(),
            row.created_at,
            row.is_submitted,
            lines,
        ))
    }

    /// Load a cart, creating and storing an empty one when absent.
    pub async fn get_or_create(&self, id: Uuid) -> EngineResult<Cart> {
        match self.find(id).await {
            Err(EngineError::NotFound { .. }) => {
                let mut cart = Cart::new(id);
                self.persist(&mut cart).await?;
                tracing::info!(cart = %id, "cart created");
                Ok(cart)
            }
            other => other,
        }
    }

    /// Write the cart's pending changes in one transaction.
    ///
    /// The log is discarded only after commit; on error it is left intact so
    /// the same cart can be persisted again.
    pub async fn persist(&self, cart: &mut Cart) -> EngineResult<()> {
        let plan = cart.persist_plan();
        if plan.is_empty() {
            return Ok(());
        }

        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;

        if let Some(dirty) = &plan.root {
            upsert_root(&mut *tx, cart, dirty).await?;
        }

        for line in &plan.upserts {
            sqlx::query(
                r#"
                INSERT INTO cart_items
                    (cart_id, product_id, quantity, source, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (cart_id, product_id) DO UPDATE SET
                    quantity = EXCLUDED.quantity,
                    source = EXCLUDED.source,
                    updated_at = NOW()
                "#,
            )
            .bind(cart.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.source.label())
            .bind(line.created_at)
            .execute(&mut *tx)
            .await
            .store_context(RESOURCE, "upsert line")?;
        }

        if !plan.removals.is_empty() {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = ANY($2)")
                .bind(cart.id)
                .bind(&plan.removals)
                .execute(&mut *tx)
                .await
                .store_context(RESOURCE, "remove lines")?;
        }

        tx.commit().await.store_context(RESOURCE, "commit")?;

        tracing::debug!(
            cart = %cart.id,
            root = plan.root.is_some(),
            upserted = plan.upserts.len(),
            removed = plan.removals.len(),
            "cart persisted"
        );
        cart.mark_persisted();
        Ok(())
    }

    /// Delete a cart; its lines go by cascade. Deleting an absent cart is
    /// not an error.
    pub async fn delete(&self, id: Uuid) -> EngineResult<()> {
        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context(RESOURCE, "delete")?;
        tx.commit().await.store_context(RESOURCE, "commit")?;
        Ok(())
    }

    /// Reload the lines of a cart with fresh catalog details.
    pub async fn load_lines(&self, id: Uuid) -> EngineResult<Vec<CartLine>> {
        let mut tx = db::begin_bounded(&self.pool, self.config.read_timeout, RESOURCE).await?;
        let lines = load_lines(&mut *tx, id).await?;
        tx.commit().await.store_context(RESOURCE, "commit")?;
        Ok(lines)
    }
}

async fn load_lines(conn: &mut PgConnection, id: Uuid) -> EngineResult<Vec<CartLine>> {
    let rows: Vec<LineRow> = sqlx::query_as(
        r#"
        SELECT ci.product_id, ci.quantity, ci.source, ci.created_at, ci.updated_at,
               cp.name, cp.category_name, cp.image_url, cp.quantity AS max_quantity
        FROM cart_items ci
        JOIN catalog_products cp ON ci.product_id = cp.id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .store_context(RESOURCE, "load lines")?;

    Ok(rows.into_iter().map(CartLine::from).collect())
}

async fn upsert_root(
    conn: &mut PgConnection,
    cart: &Cart,
    dirty: &[CartField],
) -> EngineResult<()> {
    let (sql, values) = root_upsert_statement(cart, dirty)?;
    let args = db::arguments(values).store_context(RESOURCE, "upsert")?;
    sqlx::query_with(&sql, args)
        .execute(&mut *conn)
        .await
        .store_context(RESOURCE, "upsert")?;
    Ok(())
}

/// Insert the full root; on conflict overwrite only `dirty` columns, or
/// nothing when none are dirty.
fn root_upsert_statement(
    cart: &Cart,
    dirty: &[CartField],
) -> EngineResult<(String, sea_query::Values)> {
    let fields = [
        CartField::CustomerName,
        CartField::CustomerEmail,
        CartField::CustomerPhone,
        CartField::IsSubmitted,
    ];

    let mut columns = vec![Alias::new("id"), Alias::new("created_at")];
    let mut values: Vec<SimpleExpr> = vec![cart.id.into(), cart.created_at.into()];
    for field in fields {
        columns.push(Alias::new(field.column()));
        values.push(field_value(cart, field).into());
    }

    let on_conflict = if dirty.is_empty() {
        OnConflict::column(Alias::new("id")).do_nothing().to_owned()
    } else {
        OnConflict::column(Alias::new("id"))
            .update_columns(dirty.iter().map(|f| Alias::new(f.column())))
            .to_owned()
    };

    let statement = Query::insert()
        .into_table(Alias::new("carts"))
        .columns(columns)
        .values(values)
        .map_err(|e| {
            tracing::error!(error = %e, "malformed cart upsert");
            EngineError::QueryExecutionFailed {
                resource: RESOURCE,
                operation: "upsert",
            }
        })?
        .on_conflict(on_conflict)
        .to_owned();

    Ok(statement.build(PostgresQueryBuilder))
}

fn field_value(cart: &Cart, field: CartField) -> Value {
    match field {
        CartField::CustomerName => cart.customer_name.clone().into(),
        CartField::CustomerEmail => cart.customer_email.clone().into(),
        CartField::CustomerPhone => cart.customer_phone.clone().into(),
        CartField::IsSubmitted => cart.is_submitted.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn new_cart_root_is_insert_or_nothing() {
        let cart = Cart::new(Uuid::now_v7());
        let (sql, values) = root_upsert_statement(&cart, &[]).unwrap();
        assert!(sql.starts_with(r#"INSERT INTO "carts""#), "sql: {sql}");
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"), "sql: {sql}");
        assert_eq!(values.0.len(), 6);
    }

    #[test]
    fn dirty_fields_drive_the_conflict_update() {
        let mut cart = Cart::new(Uuid::now_v7());
        cart.set_customer_email("ana@example.com");
        let dirty: Vec<_> = cart.log().dirty_fields().collect();
        let (sql, _) = root_upsert_statement(&cart, &dirty).unwrap();
        assert!(
            sql.contains(r#"DO UPDATE SET "customer_email" = "excluded"."customer_email""#),
            "sql: {sql}"
        );
        assert!(!sql.contains(r#""customer_name" = "excluded""#), "sql: {sql}");
    }

    #[test]
    fn unknown_source_label_reads_as_catalog() {
        let row = LineRow {
            product_id: Uuid::now_v7(),
            quantity: 2,
            source: "??".into(),
            created_at: Utc::now(),
            updated_at: None,
            name: "Silla".into(),
            category_name: None,
            image_url: None,
            max_quantity: 4,
        };
        let line = CartLine::from(row);
        assert_eq!(line.source, LineSource::Catalog);
        assert_eq!(line.max_quantity, 4);
    }
}
