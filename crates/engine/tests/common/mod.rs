//! Live database fixtures for store tests.
//!
//! Each [`TestDb`] owns a fresh Postgres schema created from `schema.sql`, so
//! tests never see each other's rows and can run concurrently. Every pooled
//! connection has its `search_path` pinned to that schema.
//!
//! Tests need `DATABASE_URL`; without it [`TestDb::connect`] returns `None`
//! and the test returns early.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use vitrine_engine::Config;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub struct TestDb {
    pub pool: PgPool,
    pub config: Config,
    schema: String,
}

impl TestDb {
    /// Connect and build an isolated schema, or `None` when no database is
    /// configured.
    pub async fn connect() -> Option<Self> {
        dotenvy::dotenv().ok();
        if std::env::var("DATABASE_URL").is_err() {
            eprintln!("DATABASE_URL not set, skipping live database test");
            return None;
        }
        let config = Config::from_env().expect("Failed to load config");
        let schema = format!("vitrine_test_{}", Uuid::now_v7().simple());

        let search_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .expect("Failed to connect to test database");

        pool.execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .expect("Failed to create test schema");
        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            pool.execute(statement)
                .await
                .unwrap_or_else(|e| panic!("fixture statement failed: {e}\n{statement}"));
        }

        Some(Self {
            pool,
            config,
            schema,
        })
    }

    /// Drop the schema and everything in it.
    pub async fn teardown(self) {
        self.pool
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .expect("Failed to drop test schema");
        self.pool.close().await;
    }

    pub async fn insert_event_kind(&self, name: &str, description: &str) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO event_kinds (id, name, description) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(description)
            .execute(&self.pool)
            .await
            .expect("Failed to insert event kind");
        id
    }

    pub async fn insert_product(&self, name: &str, quantity: i32) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO catalog_products (id, name, category_name, quantity)
            VALUES ($1, $2, 'Mobiliario', $3)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .expect("Failed to insert product");
        id
    }

    pub async fn set_stock(&self, product_id: Uuid, quantity: i32) {
        sqlx::query("UPDATE catalog_products SET quantity = $1 WHERE id = $2")
            .bind(quantity)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .expect("Failed to update stock");
    }
}
