//! Calculation order aggregate and its items.
//!
//! # Responsibility
//! - Define order/item records and the order status state machine.
//!
//! # Invariants
//! - Legal transitions: `draft -> formed -> completed`, `draft -> rejected`,
//!   `{draft, formed} -> deleted`.
//! - `completed`, `rejected` and `deleted` are terminal.
//! - Client and moderator are referenced by identity only.

use crate::model::isotope::IsotopeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for calculation orders.
pub type OrderId = Uuid;
/// Stable identifier for calculation items.
pub type ItemId = Uuid;
/// Opaque identity supplied by the authentication layer.
pub type UserId = Uuid;

/// Initial mass in grams assigned to freshly added items.
pub const DEFAULT_INITIAL_MASS_GRAMS: f64 = 1.0;

/// Lifecycle state of a calculation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Mutable working basket; at most one per client.
    Draft,
    /// Submitted by the client for moderation.
    Formed,
    /// Accepted by a moderator.
    Completed,
    /// Declined by a moderator.
    Rejected,
    /// Soft-deleted by the owning client.
    Deleted,
}

impl OrderStatus {
    /// Stable storage value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Formed => "formed",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// Parses a storage value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "formed" => Some(Self::Formed),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Formed)
                | (Self::Formed, Self::Completed)
                | (Self::Draft, Self::Rejected)
                | (Self::Draft, Self::Deleted)
                | (Self::Formed, Self::Deleted)
        )
    }
}

/// One client's calculation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub formed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub client_id: UserId,
    pub moderator_id: Option<UserId>,
    /// Elapsed time in years used by the latest recompute.
    pub time_elapsed_years: f64,
    /// Sum of computed item activities; `None` until something is computed.
    pub total_activity: Option<f64>,
}

/// One isotope entry within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub isotope_id: IsotopeId,
    pub initial_mass_grams: f64,
    pub remaining_activity: Option<f64>,
}

/// Item joined with the isotope fields needed for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub item: CalculationItem,
    pub isotope_name: String,
    pub half_life_years: f64,
}

/// Order with its items, as returned by detail reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: CalculationOrder,
    pub items: Vec<OrderItemView>,
}

/// Current draft pointer used by catalog pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSummary {
    pub order_id: OrderId,
    pub item_count: u32,
}

/// Result of adding an isotope to a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum AddItemOutcome {
    /// A new item was inserted with the default mass.
    Added(CalculationItem),
    /// The isotope was already in the draft; nothing changed.
    AlreadyPresent(CalculationItem),
}

impl AddItemOutcome {
    pub fn item(&self) -> &CalculationItem {
        match self {
            Self::Added(item) | Self::AlreadyPresent(item) => item,
        }
    }

    pub fn was_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// New mass for one item in a recompute batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemMassUpdate {
    pub item_id: ItemId,
    pub initial_mass_grams: f64,
}
