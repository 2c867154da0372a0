//! Generic resource query engine.
//!
//! A per-resource [`ResourceDescriptor`] declares the relation, the filter
//! keys it accepts, its search columns and its sort allow-list. A
//! [`FilterSpec`] is compiled against it into conditions, ordering and
//! pagination, and [`QueryService`] executes the count and data statements.

pub mod builder;
pub mod descriptor;
pub mod materialize;
pub mod order;
pub mod pagination;
pub mod predicate;
pub mod search;
pub mod service;
pub mod types;

pub use builder::ResourceQuery;
pub use descriptor::ResourceDescriptor;
pub use materialize::Resource;
pub use pagination::Pagination;
pub use predicate::CompiledPredicates;
pub use search::{SearchStrategy, strategy_for};
pub use service::QueryService;
pub use types::{FilterSpec, FilterValue, ResultPage, SearchMode};
