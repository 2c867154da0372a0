//! Content section persistence.
//!
//! Reads go through the `detailed_sections` view, which carries the nested
//! paragraphs and services as JSON. Writes target the base tables. Every
//! operation runs in its own transaction bounded by the configured timeout;
//! dropping a transaction on an error path rolls it back.

use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::section::{self, Mutation, Paragraph, Section, Service, SectionPlan, SkippedChild};
use crate::config::Config;
use crate::db;
use crate::error::{EngineError, EngineResult, StoreContext};

const RESOURCE: &str = "section";

const SNAPSHOT_SQL: &str = r#"
    SELECT ds.id, ds.name, ds.title, ds.image, ds.bg_image, ds.created_at, ds.updated_at,
           ds.paragraphs, ds.services, s.version
    FROM detailed_sections ds
    JOIN sections s ON s.id = ds.id
    WHERE ds.id = $1
"#;

/// Locks the root row for the rest of the write transaction.
const LOCK_SQL: &str = "SELECT id FROM sections WHERE id = $1 FOR UPDATE";

/// Versions start out NULL on rows written before versioning; they count as 0.
const BUMP_VERSION_SQL: &str = r#"
    UPDATE sections SET version = COALESCE(version, 0) + 1, updated_at = NOW()
    WHERE id = $1 AND COALESCE(version, 0) = COALESCE($2, 0)
    RETURNING version
"#;

/// What an update did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Incoming identities that matched nothing and were left alone.
    pub skipped: Vec<SkippedChild>,
    /// Root version after the update.
    pub version: Option<i32>,
}

/// Content section store.
#[derive(Clone)]
pub struct SectionStore {
    pool: PgPool,
    config: Config,
}

impl SectionStore {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self { pool, config }
    }

    /// Load the full aggregate.
    pub async fn find(&self, id: Uuid) -> EngineResult<Section> {
        let mut tx = db::begin_bounded(&self.pool, self.config.read_timeout, RESOURCE).await?;
        let section = fetch_snapshot(&mut *tx, id).await?;
        tx.commit().await.store_context(RESOURCE, "commit")?;
        section.ok_or(EngineError::NotFound { resource: RESOURCE })
    }

    /// Insert a section with all its children. Identities in `section` are
    /// ignored; the stored id is returned.
    pub async fn create(&self, section: &Section) -> EngineResult<Uuid> {
        let mut stored = section.clone();
        stored.id = Uuid::now_v7();
        let plan = section::plan_create(&stored);

        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;

        sqlx::query(
            r#"
            INSERT INTO sections (id, name, title, image, bg_image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(stored.id)
        .bind(&stored.name)
        .bind(&stored.title)
        .bind(&stored.image)
        .bind(&stored.bg_image)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .store_context(RESOURCE, "insert")?;

        for mutation in &plan.mutations {
            apply(&mut *tx, mutation).await?;
        }

        tx.commit().await.store_context(RESOURCE, "commit")?;

        tracing::info!(id = %stored.id, children = plan.mutations.len(), "section created");
        Ok(stored.id)
    }

    /// Write only what changed between the stored section and `incoming`.
    ///
    /// Identified children unknown to the store are skipped, logged and
    /// reported in the outcome. Children missing from `incoming` are kept.
    /// A non-empty plan bumps the root version, failing with
    /// [`EngineError::Conflict`] when it moved since `incoming.version` (or
    /// since the snapshot, when the caller sent none).
    ///
    /// The root row is locked before the snapshot is read, so the plan is
    /// computed against the state it is applied to.
    pub async fn update(&self, incoming: &Section) -> EngineResult<UpdateOutcome> {
        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;

        let locked: Option<Uuid> = sqlx::query_scalar(LOCK_SQL)
            .bind(incoming.id)
            .fetch_optional(&mut *tx)
            .await
            .store_context(RESOURCE, "lock")?;
        if locked.is_none() {
            return Err(EngineError::NotFound { resource: RESOURCE });
        }
        let current = fetch_snapshot(&mut *tx, incoming.id)
            .await?
            .ok_or(EngineError::NotFound { resource: RESOURCE })?;
        let plan = section::plan(&current, incoming);

        if plan.is_empty() {
            tx.commit().await.store_context(RESOURCE, "commit")?;
            tracing::debug!(id = %incoming.id, skipped = plan.skipped.len(), "section unchanged");
            return Ok(outcome(&plan, current.version));
        }

        let expected = incoming.version.or(current.version);
        let version: Option<i32> = sqlx::query_scalar(BUMP_VERSION_SQL)
            .bind(incoming.id)
            .bind(expected)
            .fetch_optional(&mut *tx)
            .await
            .store_context(RESOURCE, "bump version")?;

        let Some(version) = version else {
            tracing::warn!(id = %incoming.id, ?expected, "section version moved, rejecting update");
            return Err(EngineError::Conflict { resource: RESOURCE });
        };

        for mutation in &plan.mutations {
            apply(&mut *tx, mutation).await?;
        }

        tx.commit().await.store_context(RESOURCE, "commit")?;

        tracing::info!(
            id = %incoming.id,
            inserted = plan.inserts(),
            updated = plan.updates(),
            skipped = plan.skipped.len(),
            version,
            "section updated"
        );
        Ok(outcome(&plan, Some(version)))
    }

    /// Delete a section; children go with it by cascade.
    pub async fn delete(&self, id: Uuid) -> EngineResult<()> {
        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sections WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .store_context(RESOURCE, "exists")?;
        if !exists {
            return Err(EngineError::NotFound { resource: RESOURCE });
        }

        sqlx::query("DELETE FROM sections WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context(RESOURCE, "delete")?;

        tx.commit().await.store_context(RESOURCE, "commit")?;

        tracing::info!(%id, "section deleted");
        Ok(())
    }

    /// Append a paragraph to an existing section.
    pub async fn add_paragraph(
        &self,
        section_id: Uuid,
        paragraph: &Paragraph,
    ) -> EngineResult<Uuid> {
        let template = Section {
            id: section_id,
            paragraphs: vec![paragraph.clone()],
            ..Default::default()
        };
        let ids = self.add_children(section_id, &template).await?;
        ids.into_iter()
            .next()
            .ok_or(EngineError::QueryExecutionFailed {
                resource: RESOURCE,
                operation: "add paragraph",
            })
    }

    /// Append a service, with its items, to an existing section.
    pub async fn add_service(&self, section_id: Uuid, service: &Service) -> EngineResult<Uuid> {
        let template = Section {
            id: section_id,
            services: vec![service.clone()],
            ..Default::default()
        };
        let ids = self.add_children(section_id, &template).await?;
        ids.into_iter()
            .next()
            .ok_or(EngineError::QueryExecutionFailed {
                resource: RESOURCE,
                operation: "add service",
            })
    }

    pub async fn delete_paragraph(&self, id: Uuid) -> EngineResult<()> {
        self.delete_child("DELETE FROM section_paragraphs WHERE id = $1", id, "delete paragraph")
            .await
    }

    /// Delete a service and, by cascade, its items.
    pub async fn delete_service(&self, id: Uuid) -> EngineResult<()> {
        self.delete_child("DELETE FROM section_service WHERE id = $1", id, "delete service")
            .await
    }

    pub async fn delete_service_item(&self, id: Uuid) -> EngineResult<()> {
        self.delete_child(
            "DELETE FROM section_service_items WHERE id = $1",
            id,
            "delete service item",
        )
        .await
    }

    /// Insert the children of `template` under an existing section and
    /// return the ids of the top-level inserts.
    async fn add_children(&self, section_id: Uuid, template: &Section) -> EngineResult<Vec<Uuid>> {
        let plan = section::plan_create(template);
        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sections WHERE id = $1)")
            .bind(section_id)
            .fetch_one(&mut *tx)
            .await
            .store_context(RESOURCE, "exists")?;
        if !exists {
            return Err(EngineError::NotFound { resource: RESOURCE });
        }

        for mutation in &plan.mutations {
            apply(&mut *tx, mutation).await?;
        }
        tx.commit().await.store_context(RESOURCE, "commit")?;

        Ok(plan
            .mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::InsertParagraph { id, .. } | Mutation::InsertService { id, .. } => {
                    Some(*id)
                }
                _ => None,
            })
            .collect())
    }

    async fn delete_child(&self, sql: &str, id: Uuid, operation: &'static str) -> EngineResult<()> {
        let mut tx = db::begin_bounded(&self.pool, self.config.write_timeout, RESOURCE).await?;
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context(RESOURCE, operation)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound { resource: RESOURCE });
        }
        tx.commit().await.store_context(RESOURCE, "commit")?;
        tracing::info!(%id, operation, "section child deleted");
        Ok(())
    }
}

fn outcome(plan: &SectionPlan, version: Option<i32>) -> UpdateOutcome {
    UpdateOutcome {
        inserted: plan.inserts(),
        updated: plan.updates(),
        skipped: plan.skipped.clone(),
        version,
    }
}

async fn fetch_snapshot(conn: &mut PgConnection, id: Uuid) -> EngineResult<Option<Section>> {
    let row = sqlx::query(SNAPSHOT_SQL)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .store_context(RESOURCE, "fetch")?;

    row.map(|row| decode_section(&row).store_context(RESOURCE, "decode"))
        .transpose()
}

/// Decode a `detailed_sections` row. The optional `version` column is read
/// when present.
pub(crate) fn decode_section(row: &PgRow) -> Result<Section, sqlx::Error> {
    let paragraphs: Option<Json<Vec<Paragraph>>> = row.try_get("paragraphs")?;
    let services: Option<Json<Vec<Service>>> = row.try_get("services")?;
    let version: Option<i32> = match row.try_get("version") {
        Ok(v) => v,
        Err(sqlx::Error::ColumnNotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let mut section = Section {
        id: row.try_get("id")?,
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        image: row.try_get::<Option<String>, _>("image")?.unwrap_or_default(),
        bg_image: row.try_get::<Option<String>, _>("bg_image")?.unwrap_or_default(),
        paragraphs: paragraphs.map(|j| j.0).unwrap_or_default(),
        services: services.map(|j| j.0).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version,
    };
    section.parse_content_lists();
    Ok(section)
}

async fn apply(conn: &mut PgConnection, mutation: &Mutation) -> EngineResult<()> {
    let (query, operation) = match mutation {
        Mutation::UpdateSection {
            id,
            name,
            title,
            image,
            bg_image,
        } => (
            sqlx::query(
                r#"
                UPDATE sections SET name = $1, title = $2, image = $3, bg_image = $4
                WHERE id = $5
                "#,
            )
            .bind(name)
            .bind(title)
            .bind(image)
            .bind(bg_image)
            .bind(id),
            "update",
        ),
        Mutation::InsertParagraph {
            id,
            section_id,
            order,
            content,
        } => (
            sqlx::query(
                r#"
                INSERT INTO section_paragraphs (id, section_id, order_idx, content, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(section_id)
            .bind(order)
            .bind(content)
            .bind(Utc::now()),
            "insert paragraph",
        ),
        Mutation::UpdateParagraph { id, order, content } => (
            sqlx::query("UPDATE section_paragraphs SET order_idx = $1, content = $2 WHERE id = $3")
                .bind(order)
                .bind(content)
                .bind(id),
            "update paragraph",
        ),
        Mutation::InsertService {
            id,
            section_id,
            title,
            price,
            description,
        } => (
            sqlx::query(
                r#"
                INSERT INTO section_service (id, section_id, title, price, description, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(section_id)
            .bind(title)
            .bind(price)
            .bind(description)
            .bind(Utc::now()),
            "insert service",
        ),
        Mutation::UpdateService {
            id,
            title,
            price,
            description,
        } => (
            sqlx::query(
                "UPDATE section_service SET title = $1, price = $2, description = $3 WHERE id = $4",
            )
            .bind(title)
            .bind(price)
            .bind(description)
            .bind(id),
            "update service",
        ),
        Mutation::InsertServiceItem {
            id,
            service_id,
            order,
            price,
            content,
            content_as_list,
        } => (
            sqlx::query(
                r#"
                INSERT INTO section_service_items
                    (id, service_id, order_idx, price, content, content_as_list, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(id)
            .bind(service_id)
            .bind(order)
            .bind(price)
            .bind(content)
            .bind(content_as_list)
            .bind(Utc::now()),
            "insert service item",
        ),
        Mutation::UpdateServiceItem {
            id,
            order,
            price,
            content,
            content_as_list,
        } => (
            sqlx::query(
                r#"
                UPDATE section_service_items
                SET order_idx = $1, price = $2, content = $3, content_as_list = $4
                WHERE id = $5
                "#,
            )
            .bind(order)
            .bind(price)
            .bind(content)
            .bind(content_as_list)
            .bind(id),
            "update service item",
        ),
    };

    query
        .execute(&mut *conn)
        .await
        .store_context(RESOURCE, operation)?;
    Ok(())
}
