//! Vitrine engine library.
//!
//! Filtered, ranked and paginated listings over a per-resource descriptor
//! table, change-detecting persistence for content sections, and shopping
//! cart reconciliation. The `vitrine` binary is a thin operator front end.

pub mod aggregate;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod resources;

pub use config::Config;
pub use error::{EngineError, EngineResult};
