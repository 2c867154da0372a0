//! Row materialization.
//!
//! Every queryable resource scans its row into a typed shape and may then
//! apply read-time corrections. The write path stores what it is given; only
//! reads re-derive values such as availability.

use serde::Serialize;
use sqlx::FromRow;
use sqlx::postgres::PgRow;

use super::descriptor::ResourceDescriptor;
use crate::error::{EngineError, EngineResult};

/// A resource the query engine can list.
pub trait Resource: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin {
    /// The resource's descriptor table.
    fn descriptor() -> &'static ResourceDescriptor;

    /// Read-time business corrections. Default: none.
    fn correct(&mut self) {}
}

/// Scan rows into `R`, applying corrections, keeping row order.
pub fn materialize<R: Resource>(rows: &[PgRow]) -> EngineResult<Vec<R>> {
    let resource = R::descriptor().name;
    rows.iter()
        .map(|row| {
            let mut item =
                R::from_row(row).map_err(|e| EngineError::from_sqlx(resource, "decode", e))?;
            item.correct();
            Ok(item)
        })
        .collect()
}

/// Split on a delimiter, trimming each part and dropping empty ones.
pub(crate) fn split_list(content: &str, delimiter: &str) -> Vec<String> {
    content
        .split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
