//! Capability checks for catalog and order operations.
//!
//! # Responsibility
//! - Decide allow/deny from `(caller, operation, resource)` alone.
//! - Stay independent of transport/request shapes.
//!
//! # Invariants
//! - Moderator capability is an opaque fact supplied by the identity layer.
//! - Order mutations are owner-only; moderators act through
//!   `Operation::ModerateOrder`.

use crate::model::order::UserId;
use serde::{Deserialize, Serialize};

/// Authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub is_moderator: bool,
}

impl Caller {
    pub fn client(user_id: UserId) -> Self {
        Self {
            user_id,
            is_moderator: false,
        }
    }

    pub fn moderator(user_id: UserId) -> Self {
        Self {
            user_id,
            is_moderator: true,
        }
    }
}

/// Operation classes gated by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    ReadCatalog,
    ManageCatalog,
    ReadOrder,
    ModifyOrder,
    ModerateOrder,
}

impl Operation {
    /// Stable id used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadCatalog => "catalog.read",
            Self::ManageCatalog => "catalog.manage",
            Self::ReadOrder => "order.read",
            Self::ModifyOrder => "order.modify",
            Self::ModerateOrder => "order.moderate",
        }
    }
}

/// Target of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Catalog,
    /// Every client's orders, as seen by the moderation queue.
    OrderQueue,
    Order { client_id: UserId },
}

/// Why a check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ModeratorRequired,
    NotOwner,
}

/// Outcome of one access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Evaluates the access policy.
pub fn check_access(caller: &Caller, operation: Operation, resource: Resource) -> AccessDecision {
    let is_owner = match resource {
        Resource::Order { client_id } => client_id == caller.user_id,
        Resource::Catalog | Resource::OrderQueue => false,
    };

    match operation {
        Operation::ReadCatalog => AccessDecision::Allow,
        Operation::ManageCatalog | Operation::ModerateOrder => {
            if caller.is_moderator {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::ModeratorRequired)
            }
        }
        Operation::ReadOrder => {
            if is_owner || caller.is_moderator {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::NotOwner)
            }
        }
        Operation::ModifyOrder => {
            if is_owner {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::NotOwner)
            }
        }
    }
}
