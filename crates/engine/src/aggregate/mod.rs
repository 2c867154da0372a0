//! Aggregate persistence with change detection.
//!
//! Incoming aggregate state is diffed against the persisted snapshot into a
//! plan of minimal writes, then the plan runs in one transaction.

pub mod section;
pub mod store;

pub use section::{
    ChildKind, ITEM_LIST_SEPARATOR, Mutation, Paragraph, Section, SectionPlan, Service,
    ServiceItem, SkippedChild, plan, plan_create,
};
pub use store::{SectionStore, UpdateOutcome};

use uuid::Uuid;

/// A child record matched by identity during change detection.
pub trait Keyed {
    /// Persisted identity; `None` for records not yet stored.
    fn key(&self) -> Option<Uuid>;

    /// Whether any stored content field differs. Timestamps and derived
    /// fields do not count.
    fn content_differs(&self, other: &Self) -> bool;
}

/// How an incoming child relates to the snapshot.
#[derive(Debug)]
pub enum ChildMatch<'a, T> {
    /// No identity: insert.
    New,
    /// Identity present in the snapshot.
    Existing(&'a T),
    /// Identity unknown to the snapshot.
    Orphan(Uuid),
}

pub fn match_child<'a, T: Keyed>(current: &'a [T], incoming: &T) -> ChildMatch<'a, T> {
    let Some(id) = incoming.key() else {
        return ChildMatch::New;
    };
    match current.iter().find(|c| c.key() == Some(id)) {
        Some(existing) => ChildMatch::Existing(existing),
        None => ChildMatch::Orphan(id),
    }
}
