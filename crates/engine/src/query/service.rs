//! Query execution.

use sqlx::PgPool;

use super::builder::ResourceQuery;
use super::materialize::{Resource, materialize};
use super::types::{FilterSpec, ResultPage};
use crate::config::Config;
use crate::db;
use crate::error::{EngineResult, StoreContext};

/// Runs filtered, ranked, paginated listings.
#[derive(Clone)]
pub struct QueryService {
    pool: PgPool,
    config: Config,
}

impl QueryService {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self { pool, config }
    }

    /// Resolve `spec` against `R`'s descriptor without touching the store.
    pub fn plan<R: Resource>(&self, spec: &FilterSpec) -> EngineResult<ResourceQuery<'static>> {
        ResourceQuery::plan(R::descriptor(), spec, &self.config.search_language)
    }

    /// One page of `R` matching `spec`.
    ///
    /// Count and data run in one read transaction bounded by the read
    /// timeout. A page past the end skips the data statement.
    pub async fn query<R: Resource>(&self, spec: &FilterSpec) -> EngineResult<ResultPage<R>> {
        let query = self.plan::<R>(spec)?;
        let resource = R::descriptor().name;
        let pagination = query.pagination();

        let mut tx = db::begin_bounded(&self.pool, self.config.read_timeout, resource).await?;

        let (count_sql, count_values) = query.build_count();
        let args = db::arguments(count_values).store_context(resource, "count")?;
        let total: i64 = sqlx::query_scalar_with(&count_sql, args)
            .fetch_one(&mut *tx)
            .await
            .store_context(resource, "count")?;
        let total = u64::try_from(total).unwrap_or_default();

        if total == 0 || pagination.offset() >= total {
            tx.commit().await.store_context(resource, "commit")?;
            tracing::debug!(resource, total, page = pagination.page, "page past end of results");
            return Ok(ResultPage::new(Vec::new(), total, &pagination));
        }

        let (data_sql, data_values) = query.build_data();
        let args = db::arguments(data_values).store_context(resource, "list")?;
        let rows = sqlx::query_with(&data_sql, args)
            .fetch_all(&mut *tx)
            .await
            .store_context(resource, "list")?;

        tx.commit().await.store_context(resource, "commit")?;

        let items = materialize::<R>(&rows)?;
        let expected = pagination.expected_len(total);
        if items.len() as u64 != expected {
            // Count and data read different snapshots; a concurrent write
            // landed between them.
            tracing::warn!(
                resource,
                total,
                expected,
                returned = items.len(),
                "page size disagrees with count"
            );
        }
        tracing::debug!(
            resource,
            total,
            page = pagination.page,
            returned = items.len(),
            "query complete"
        );

        Ok(ResultPage::new(items, total, &pagination))
    }
}
