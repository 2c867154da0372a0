//! Content section aggregate and its change-detection plan.
//!
//! A section owns ordered paragraphs and services; services own ordered
//! items. [`plan`] compares an incoming section against the persisted
//! snapshot and emits the minimal set of writes:
//!
//! - root: one update, only when a content field differs
//! - identified child found in the snapshot: update only on difference
//! - child without an identity: insert, with a freshly allocated id, and
//!   every descendant inserted with it
//! - identified child missing from the snapshot: skipped and reported
//!
//! Children absent from the incoming section are never deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChildMatch, Keyed, match_child};
use crate::query::materialize::split_list;

/// Separator between entries of a list-style service item.
pub const ITEM_LIST_SEPARATOR: &str = "<=>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub bg_image: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Root version this state was read at. Echo it back on update to
    /// detect concurrent edits.
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub section_id: Option<Uuid>,
    #[serde(default, alias = "order_idx")]
    pub order: i32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A priced service. Prices are in cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub section_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<ServiceItem>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default, alias = "order_idx")]
    pub order: i32,
    #[serde(default)]
    pub price: i32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_as_list: bool,
    /// `content` split on [`ITEM_LIST_SEPARATOR`]; filled on read for
    /// list-style items.
    #[serde(default)]
    pub content_list: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Section {
    fn content_differs(&self, other: &Self) -> bool {
        self.name != other.name
            || self.title != other.title
            || self.image != other.image
            || self.bg_image != other.bg_image
    }

    /// Fill `content_list` on every list-style item.
    pub fn parse_content_lists(&mut self) {
        for item in self.services.iter_mut().flat_map(|s| s.items.iter_mut()) {
            item.parse_content_list();
        }
    }
}

impl ServiceItem {
    /// Split `content` into entries. Items not flagged as lists get none.
    pub fn parse_content_list(&mut self) {
        self.content_list = if self.content_as_list {
            split_list(&self.content, ITEM_LIST_SEPARATOR)
        } else {
            Vec::new()
        };
    }
}

impl Keyed for Paragraph {
    fn key(&self) -> Option<Uuid> {
        self.id
    }

    fn content_differs(&self, other: &Self) -> bool {
        self.order != other.order || self.content != other.content
    }
}

impl Keyed for Service {
    fn key(&self) -> Option<Uuid> {
        self.id
    }

    fn content_differs(&self, other: &Self) -> bool {
        self.title != other.title
            || self.price != other.price
            || self.description != other.description
    }
}

impl Keyed for ServiceItem {
    fn key(&self) -> Option<Uuid> {
        self.id
    }

    fn content_differs(&self, other: &Self) -> bool {
        self.order != other.order
            || self.price != other.price
            || self.content != other.content
            || self.content_as_list != other.content_as_list
    }
}

/// One write against the section tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    UpdateSection {
        id: Uuid,
        name: String,
        title: String,
        image: String,
        bg_image: String,
    },
    InsertParagraph {
        id: Uuid,
        section_id: Uuid,
        order: i32,
        content: String,
    },
    UpdateParagraph {
        id: Uuid,
        order: i32,
        content: String,
    },
    InsertService {
        id: Uuid,
        section_id: Uuid,
        title: String,
        price: i32,
        description: String,
    },
    UpdateService {
        id: Uuid,
        title: String,
        price: i32,
        description: String,
    },
    InsertServiceItem {
        id: Uuid,
        service_id: Uuid,
        order: i32,
        price: i32,
        content: String,
        content_as_list: bool,
    },
    UpdateServiceItem {
        id: Uuid,
        order: i32,
        price: i32,
        content: String,
        content_as_list: bool,
    },
}

impl Mutation {
    pub fn is_insert(&self) -> bool {
        matches!(
            self,
            Self::InsertParagraph { .. }
                | Self::InsertService { .. }
                | Self::InsertServiceItem { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Paragraph,
    Service,
    ServiceItem,
}

/// An incoming identity with no counterpart in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedChild {
    pub kind: ChildKind,
    pub id: Uuid,
}

/// Writes needed to bring a snapshot to an incoming state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionPlan {
    pub mutations: Vec<Mutation>,
    pub skipped: Vec<SkippedChild>,
}

impl SectionPlan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn inserts(&self) -> usize {
        self.mutations.iter().filter(|m| m.is_insert()).count()
    }

    pub fn updates(&self) -> usize {
        self.mutations.len() - self.inserts()
    }
}

/// Compute the writes that turn `current` into `incoming`.
pub fn plan(current: &Section, incoming: &Section) -> SectionPlan {
    let mut out = SectionPlan::default();
    let section_id = current.id;

    if current.content_differs(incoming) {
        out.mutations.push(Mutation::UpdateSection {
            id: section_id,
            name: incoming.name.clone(),
            title: incoming.title.clone(),
            image: incoming.image.clone(),
            bg_image: incoming.bg_image.clone(),
        });
    }

    for paragraph in &incoming.paragraphs {
        match match_child(&current.paragraphs, paragraph) {
            ChildMatch::New => out.mutations.push(insert_paragraph(section_id, paragraph)),
            ChildMatch::Existing(existing) => {
                if existing.content_differs(paragraph)
                    && let Some(id) = existing.id
                {
                    out.mutations.push(Mutation::UpdateParagraph {
                        id,
                        order: paragraph.order,
                        content: paragraph.content.clone(),
                    });
                }
            }
            ChildMatch::Orphan(id) => skip(&mut out, ChildKind::Paragraph, id),
        }
    }

    for service in &incoming.services {
        match match_child(&current.services, service) {
            ChildMatch::New => insert_service(&mut out, section_id, service),
            ChildMatch::Existing(existing) => {
                let Some(service_id) = existing.id else {
                    continue;
                };
                if existing.content_differs(service) {
                    out.mutations.push(Mutation::UpdateService {
                        id: service_id,
                        title: service.title.clone(),
                        price: service.price,
                        description: service.description.clone(),
                    });
                }
                plan_items(&mut out, service_id, &existing.items, &service.items);
            }
            // The subtree goes with it.
            ChildMatch::Orphan(id) => skip(&mut out, ChildKind::Service, id),
        }
    }

    out
}

/// Insert writes for a complete section, allocating every identity.
pub fn plan_create(section: &Section) -> SectionPlan {
    let mut out = SectionPlan::default();
    for paragraph in &section.paragraphs {
        out.mutations.push(insert_paragraph(section.id, paragraph));
    }
    for service in &section.services {
        insert_service(&mut out, section.id, service);
    }
    out
}

fn plan_items(
    out: &mut SectionPlan,
    service_id: Uuid,
    current: &[ServiceItem],
    incoming: &[ServiceItem],
) {
    for item in incoming {
        match match_child(current, item) {
            ChildMatch::New => out.mutations.push(insert_item(service_id, item)),
            ChildMatch::Existing(existing) => {
                if existing.content_differs(item)
                    && let Some(id) = existing.id
                {
                    out.mutations.push(Mutation::UpdateServiceItem {
                        id,
                        order: item.order,
                        price: item.price,
                        content: item.content.clone(),
                        content_as_list: item.content_as_list,
                    });
                }
            }
            ChildMatch::Orphan(id) => skip(out, ChildKind::ServiceItem, id),
        }
    }
}

fn insert_paragraph(section_id: Uuid, paragraph: &Paragraph) -> Mutation {
    Mutation::InsertParagraph {
        id: Uuid::now_v7(),
        section_id,
        order: paragraph.order,
        content: paragraph.content.clone(),
    }
}

/// A new service carries all of its items as new, whatever ids they hold.
fn insert_service(out: &mut SectionPlan, section_id: Uuid, service: &Service) {
    let id = Uuid::now_v7();
    out.mutations.push(Mutation::InsertService {
        id,
        section_id,
        title: service.title.clone(),
        price: service.price,
        description: service.description.clone(),
    });
    for item in &service.items {
        out.mutations.push(insert_item(id, item));
    }
}

fn insert_item(service_id: Uuid, item: &ServiceItem) -> Mutation {
    Mutation::InsertServiceItem {
        id: Uuid::now_v7(),
        service_id,
        order: item.order,
        price: item.price,
        content: item.content.clone(),
        content_as_list: item.content_as_list,
    }
}

fn skip(out: &mut SectionPlan, kind: ChildKind, id: Uuid) {
    tracing::warn!(?kind, %id, "identity not in current snapshot, skipping");
    out.skipped.push(SkippedChild { kind, id });
}
