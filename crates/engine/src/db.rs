//! Database connection pool management and statement plumbing.

use std::time::Duration;

use anyhow::{Context, Result};
use sea_query::{Value, Values};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::{Arguments, Postgres, Transaction};

use crate::config::Config;
use crate::error::{EngineResult, StoreContext};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Begin a transaction whose statements are bounded by `timeout`.
///
/// `SET LOCAL` resets on commit or rollback, so the pooled connection goes
/// back without the limit. Dropping the transaction without committing rolls
/// it back.
pub(crate) async fn begin_bounded(
    pool: &PgPool,
    timeout: Duration,
    resource: &'static str,
) -> EngineResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.store_context(resource, "begin")?;

    let millis = timeout.as_millis().max(1);
    sqlx::query(&format!("SET LOCAL statement_timeout = '{millis}ms'"))
        .execute(&mut *tx)
        .await
        .store_context(resource, "set statement timeout")?;

    Ok(tx)
}

/// Convert sea-query's positional values into sqlx arguments, in order.
pub(crate) fn arguments(values: Values) -> Result<PgArguments, sqlx::Error> {
    let mut args = PgArguments::default();
    for value in values.0 {
        let added = match value {
            Value::Bool(v) => args.add(v),
            Value::TinyInt(v) => args.add(v.map(i16::from)),
            Value::SmallInt(v) => args.add(v),
            Value::Int(v) => args.add(v),
            Value::BigInt(v) => args.add(v),
            Value::TinyUnsigned(v) => args.add(v.map(i16::from)),
            Value::SmallUnsigned(v) => args.add(v.map(i32::from)),
            Value::Unsigned(v) => args.add(v.map(i64::from)),
            Value::BigUnsigned(v) => {
                let v = v
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
                args.add(v)
            }
            Value::Float(v) => args.add(v),
            Value::Double(v) => args.add(v),
            Value::String(v) => args.add(v.map(|s| *s)),
            Value::Char(v) => args.add(v.map(String::from)),
            Value::Bytes(v) => args.add(v.map(|b| *b)),
            Value::Uuid(v) => args.add(v.map(|u| *u)),
            Value::ChronoDateTimeUtc(v) => args.add(v.map(|t| *t)),
            Value::ChronoDate(v) => args.add(v.map(|d| *d)),
            other => {
                return Err(sqlx::Error::Encode(
                    format!("unsupported bind value: {other:?}").into(),
                ));
            }
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}
