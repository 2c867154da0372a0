//! Shopping cart aggregate.
//!
//! Edits happen in memory and are recorded in a [`MutationLog`]; nothing
//! touches the store until [`CartStore::persist`]. Removed lines are queued
//! for deletion instead of being deleted in place.

pub mod store;

pub use store::CartStore;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a line was added from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    Wizard,
    Catalog,
}

impl LineSource {
    /// Label stored in `cart_items.source`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Wizard => "asistente",
            Self::Catalog => "catálogo",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "asistente" | "wizard" => Some(Self::Wizard),
            "catálogo" | "catalogo" | "catalog" => Some(Self::Catalog),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Stock available for the product.
    pub max_quantity: i32,
    pub source: LineSource,
    /// Wizard step the line was picked at. Not persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartLine {
    pub fn new(product_id: Uuid, quantity: i32, max_quantity: i32, source: LineSource) -> Self {
        Self {
            product_id,
            name: String::new(),
            category: None,
            image_url: None,
            quantity,
            max_quantity,
            source,
            step_index: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Root fields that can be marked dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CartField {
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    IsSubmitted,
}

impl CartField {
    pub fn column(self) -> &'static str {
        match self {
            Self::CustomerName => "customer_name",
            Self::CustomerEmail => "customer_email",
            Self::CustomerPhone => "customer_phone",
            Self::IsSubmitted => "is_submitted",
        }
    }
}

/// Pending changes since the last successful persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationLog {
    dirty: BTreeSet<CartField>,
    lines_changed: bool,
    is_new: bool,
    removed: Vec<Uuid>,
}

impl MutationLog {
    pub fn dirty_fields(&self) -> impl Iterator<Item = CartField> + '_ {
        self.dirty.iter().copied()
    }

    pub fn lines_changed(&self) -> bool {
        self.lines_changed
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Products queued for deletion, in the order they were removed.
    pub fn removed(&self) -> &[Uuid] {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && !self.lines_changed && !self.is_new && self.removed.is_empty()
    }

    fn queue_removal(&mut self, product_id: Uuid) {
        if !self.removed.contains(&product_id) {
            self.removed.push(product_id);
        }
    }

    fn cancel_removal(&mut self, product_id: Uuid) {
        self.removed.retain(|id| *id != product_id);
    }
}

/// One line row to upsert. `quantity` is already capped at the stock bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineWrite {
    pub product_id: Uuid,
    pub quantity: i32,
    pub source: LineSource,
    pub created_at: DateTime<Utc>,
}

/// What a persist has to write.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistPlan {
    /// Root upsert, with the fields to overwrite on conflict.
    pub root: Option<Vec<CartField>>,
    pub upserts: Vec<LineWrite>,
    pub removals: Vec<Uuid>,
}

impl PersistPlan {
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.upserts.is_empty() && self.removals.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_submitted: bool,
    #[serde(default, rename = "items")]
    lines: Vec<CartLine>,
    #[serde(skip)]
    log: MutationLog,
}

impl Cart {
    /// A cart not yet stored. Persisting it writes the root even with no
    /// dirty fields.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            created_at: Utc::now(),
            is_submitted: false,
            lines: Vec::new(),
            log: MutationLog {
                is_new: true,
                ..Default::default()
            },
        }
    }

    /// A cart as read from the store. The log is clean unless a line holds
    /// more than its current stock bound, in which case lines are marked
    /// changed so the next persist writes the capped quantity.
    pub(crate) fn stored(
        id: Uuid,
        customer_name: String,
        customer_email: String,
        customer_phone: String,
        created_at: DateTime<Utc>,
        is_submitted: bool,
        lines: Vec<CartLine>,
    ) -> Self {
        Self {
            id,
            customer_name,
            customer_email,
            customer_phone,
            created_at,
            is_submitted,
            log: MutationLog {
                lines_changed: lines.iter().any(|l| l.quantity > l.max_quantity),
                ..Default::default()
            },
            lines,
        }
    }

    pub fn log(&self) -> &MutationLog {
        &self.log
    }

    pub fn set_customer_name(&mut self, value: impl Into<String>) {
        self.customer_name = value.into();
        self.log.dirty.insert(CartField::CustomerName);
    }

    pub fn set_customer_email(&mut self, value: impl Into<String>) {
        self.customer_email = value.into();
        self.log.dirty.insert(CartField::CustomerEmail);
    }

    pub fn set_customer_phone(&mut self, value: impl Into<String>) {
        self.customer_phone = value.into();
        self.log.dirty.insert(CartField::CustomerPhone);
    }

    pub fn set_submitted(&mut self, submitted: bool) {
        self.is_submitted = submitted;
        self.log.dirty.insert(CartField::IsSubmitted);
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Quantity of `product_id` in the cart, 0 when absent.
    pub fn quantity_of(&self, product_id: Uuid) -> i32 {
        self.line(product_id).map_or(0, |l| l.quantity)
    }

    pub fn total_quantity(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Merge `line` into the cart. An existing line for the same product
    /// gains the quantity; either way the result is capped at the stock
    /// bound. Non-positive quantities are ignored.
    pub fn add_item(&mut self, line: CartLine) {
        if line.quantity <= 0 {
            tracing::debug!(
                cart = %self.id,
                product = %line.product_id,
                "ignoring non-positive add"
            );
            return;
        }
        let product_id = line.product_id;
        self.log.lines_changed = true;
        self.log.cancel_removal(product_id);

        let quantity = match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(existing) => {
                existing.max_quantity = line.max_quantity;
                existing.quantity = existing
                    .quantity
                    .saturating_add(line.quantity)
                    .min(existing.max_quantity);
                existing.quantity
            }
            None => {
                let mut line = line;
                line.quantity = line.quantity.min(line.max_quantity);
                let quantity = line.quantity;
                self.lines.push(line);
                quantity
            }
        };

        if quantity <= 0 {
            self.remove_item(product_id);
        }
    }

    /// Set a line's quantity, capped at its stock bound. Zero or less
    /// removes the line.
    pub fn update_item_qty(&mut self, product_id: Uuid, quantity: i32) {
        if quantity <= 0 {
            self.remove_item(product_id);
            return;
        }
        let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) else {
            tracing::debug!(
                cart = %self.id,
                product = %product_id,
                "quantity update for absent line"
            );
            return;
        };
        line.quantity = quantity.min(line.max_quantity);
        let capped = line.quantity;
        self.log.lines_changed = true;
        if capped <= 0 {
            self.remove_item(product_id);
        }
    }

    /// Drop a line and queue its deletion.
    pub fn remove_item(&mut self, product_id: Uuid) {
        self.log.lines_changed = true;
        self.lines.retain(|l| l.product_id != product_id);
        self.log.queue_removal(product_id);
    }

    /// Queue every line for deletion.
    pub fn clear(&mut self) {
        for line in std::mem::take(&mut self.lines) {
            self.log.queue_removal(line.product_id);
        }
        self.log.lines_changed = true;
    }

    /// The writes a persist would run.
    ///
    /// Every written quantity is capped at the line's stock bound; a line
    /// whose capped quantity is not positive is removed instead.
    pub fn persist_plan(&self) -> PersistPlan {
        let root = (self.log.is_new || !self.log.dirty.is_empty())
            .then(|| self.log.dirty.iter().copied().collect());
        let mut upserts = Vec::new();
        let mut removals = self.log.removed.clone();
        if self.log.lines_changed || self.log.is_new {
            for line in &self.lines {
                let quantity = line.quantity.min(line.max_quantity);
                if quantity > 0 {
                    upserts.push(LineWrite {
                        product_id: line.product_id,
                        quantity,
                        source: line.source,
                        created_at: line.created_at,
                    });
                } else if !removals.contains(&line.product_id) {
                    removals.push(line.product_id);
                }
            }
        }
        PersistPlan {
            root,
            upserts,
            removals,
        }
    }

    /// Discard the log once its writes are committed, and bring the lines in
    /// line with what was written.
    pub(crate) fn mark_persisted(&mut self) {
        for line in &mut self.lines {
            line.quantity = line.quantity.min(line.max_quantity);
        }
        self.lines.retain(|l| l.quantity > 0);
        self.log = MutationLog::default();
    }
}
