//! Calculation order lifecycle service.
//!
//! # Responsibility
//! - Mediate every order/item mutation and apply the access policy first.
//! - Drive the status state machine and recomputation.
//!
//! # Invariants
//! - Ownership failures on reads and mutations surface as not-found so other
//!   clients' orders are never disclosed.
//! - Capability failures (moderation) surface as `Forbidden` before any
//!   lookup or write.
//! - Draft creation conflicts are resolved in the repository and never reach
//!   callers.

use crate::access::{check_access, AccessDecision, Caller, DenyReason, Operation, Resource};
use crate::model::isotope::IsotopeId;
use crate::model::order::{
    AddItemOutcome, CalculationOrder, DraftSummary, ItemId, ItemMassUpdate, OrderDetail, OrderId,
    OrderStatus,
};
use crate::model::{require_non_negative, ValidationError};
use crate::repo::order_repo::{OrderListQuery, OrderRepository};
use crate::repo::{EntityKind, RepoError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Errors from order lifecycle operations.
#[derive(Debug)]
pub enum OrderServiceError {
    /// Elapsed time or mass input is out of range.
    Validation(ValidationError),
    /// Referenced entity does not exist or is not visible to the caller.
    NotFound { kind: EntityKind, id: Uuid },
    /// Caller lacks the capability for the operation.
    Forbidden(Operation),
    /// Order is not in a status the operation can start from.
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// Order items can only change while the order is a draft.
    NotEditable {
        order_id: OrderId,
        status: OrderStatus,
    },
    /// Forming requires at least one item.
    EmptyOrder(OrderId),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for OrderServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::Forbidden(operation) => {
                write!(f, "operation `{}` is not permitted", operation.as_str())
            }
            Self::InvalidTransition { order_id, from, to } => write!(
                f,
                "order {order_id} cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            Self::NotEditable { order_id, status } => write!(
                f,
                "order {order_id} is {} and its items cannot change",
                status.as_str()
            ),
            Self::EmptyOrder(order_id) => write!(f, "order {order_id} has no items"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OrderServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for OrderServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            RepoError::StatusConflict { order_id, status } => {
                Self::NotEditable { order_id, status }
            }
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for OrderServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Order lifecycle facade over repository implementations.
pub struct OrderService<R: OrderRepository> {
    repo: R,
}

impl<R: OrderRepository> OrderService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns the caller's draft, creating an empty one when absent.
    pub fn get_or_create_draft(
        &mut self,
        caller: &Caller,
    ) -> Result<CalculationOrder, OrderServiceError> {
        Ok(self.repo.get_or_create_draft(caller.user_id)?)
    }

    /// Adds an isotope to the caller's draft with the default mass.
    ///
    /// Adding an isotope that is already in the draft is not an error; the
    /// outcome is `AddItemOutcome::AlreadyPresent` and nothing changes.
    pub fn add_isotope(
        &mut self,
        caller: &Caller,
        isotope_id: IsotopeId,
    ) -> Result<AddItemOutcome, OrderServiceError> {
        let (draft, outcome) = self.repo.add_to_draft(caller.user_id, isotope_id)?;
        let status = if outcome.was_added() {
            "added"
        } else {
            "already_present"
        };
        info!(
            "event=order_add_isotope module=order status={} order_id={} isotope_id={}",
            status, draft.id, isotope_id
        );
        Ok(outcome)
    }

    /// Removes one item from the caller's draft. The order itself stays even
    /// when it becomes empty.
    pub fn remove_item(&mut self, caller: &Caller, item_id: ItemId) -> Result<(), OrderServiceError> {
        let item = self
            .repo
            .get_client_item(item_id, caller.user_id)?
            .ok_or(OrderServiceError::NotFound {
                kind: EntityKind::Item,
                id: item_id,
            })?;
        let order = self.load_for(caller, item.order_id, Operation::ModifyOrder)?;
        if order.status != OrderStatus::Draft {
            return Err(OrderServiceError::NotEditable {
                order_id: order.id,
                status: order.status,
            });
        }

        if self.repo.delete_item(item_id, caller.user_id)? == 0 {
            return Err(OrderServiceError::NotFound {
                kind: EntityKind::Item,
                id: item_id,
            });
        }
        info!(
            "event=order_remove_item module=order status=ok order_id={} item_id={}",
            order.id, item_id
        );
        Ok(())
    }

    /// Applies new masses and elapsed time, recomputing activities.
    ///
    /// Only the submitted items are recomputed; the order total sums every
    /// item that has a computed activity. Any invalid mass or unknown item
    /// rejects the whole batch.
    pub fn recompute_order(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
        time_elapsed_years: f64,
        updates: &[ItemMassUpdate],
    ) -> Result<CalculationOrder, OrderServiceError> {
        let started_at = Instant::now();
        let time_elapsed_years = require_non_negative("time_elapsed_years", time_elapsed_years)?;
        self.load_for(caller, order_id, Operation::ModifyOrder)?;

        match self
            .repo
            .recompute(order_id, caller.user_id, time_elapsed_years, updates)
        {
            Ok(order) => {
                info!(
                    "event=order_recompute module=order status=ok order_id={} items={} duration_ms={}",
                    order_id,
                    updates.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(order)
            }
            Err(err) => {
                warn!(
                    "event=order_recompute module=order status=rolled_back order_id={} duration_ms={} error={}",
                    order_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Submits the caller's draft for moderation (`draft -> formed`).
    pub fn form_order(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<CalculationOrder, OrderServiceError> {
        let order = self.load_for(caller, order_id, Operation::ModifyOrder)?;
        ensure_transition(&order, OrderStatus::Formed)?;
        if self.repo.count_items(order_id)? == 0 {
            return Err(OrderServiceError::EmptyOrder(order_id));
        }

        if self.repo.form_order(order_id, caller.user_id)? == 0 {
            return Err(self.stale_transition(order_id, OrderStatus::Formed));
        }
        info!("event=order_form module=order status=ok order_id={order_id}");
        self.reload(order_id)
    }

    /// Completes a formed order. Moderator only.
    pub fn complete_order(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<CalculationOrder, OrderServiceError> {
        self.moderate(caller, order_id, OrderStatus::Completed)
    }

    /// Rejects a draft order. Moderator only.
    pub fn reject_order(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<CalculationOrder, OrderServiceError> {
        self.moderate(caller, order_id, OrderStatus::Rejected)
    }

    /// Soft-deletes the caller's order.
    ///
    /// Returns the number of affected rows: `0` when the caller does not own
    /// the order or it is already terminal.
    pub fn soft_delete_order(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<usize, OrderServiceError> {
        let affected = self.repo.soft_delete_order(order_id, caller.user_id)?;
        info!(
            "event=order_soft_delete module=order status=ok order_id={} affected_rows={}",
            order_id, affected
        );
        Ok(affected)
    }

    /// Loads one order with its items.
    pub fn get_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<OrderDetail, OrderServiceError> {
        let order = self.load_for(caller, order_id, Operation::ReadOrder)?;
        let items = self.repo.list_items(order_id)?;
        Ok(OrderDetail { order, items })
    }

    /// Lists non-deleted orders: all of them for moderators, own otherwise.
    pub fn list_orders(&self, caller: &Caller) -> Result<Vec<CalculationOrder>, OrderServiceError> {
        let sees_queue =
            check_access(caller, Operation::ReadOrder, Resource::OrderQueue).is_allowed();
        let query = OrderListQuery {
            client_id: if sees_queue {
                None
            } else {
                Some(caller.user_id)
            },
        };
        Ok(self.repo.list_orders(&query)?)
    }

    /// Returns the caller's current draft pointer, if any.
    pub fn draft_summary(&self, caller: &Caller) -> Result<Option<DraftSummary>, OrderServiceError> {
        let Some(draft) = self.repo.find_draft(caller.user_id)? else {
            return Ok(None);
        };
        let item_count = self.repo.count_items(draft.id)?;
        Ok(Some(DraftSummary {
            order_id: draft.id,
            item_count,
        }))
    }

    fn moderate(
        &mut self,
        caller: &Caller,
        order_id: OrderId,
        to: OrderStatus,
    ) -> Result<CalculationOrder, OrderServiceError> {
        if let AccessDecision::Deny(_) =
            check_access(caller, Operation::ModerateOrder, Resource::OrderQueue)
        {
            warn!(
                "event=access_denied module=order status=denied operation={} user_id={} order_id={}",
                Operation::ModerateOrder.as_str(),
                caller.user_id,
                order_id
            );
            return Err(OrderServiceError::Forbidden(Operation::ModerateOrder));
        }

        let order = self.load_for(caller, order_id, Operation::ModerateOrder)?;
        ensure_transition(&order, to)?;
        if self
            .repo
            .moderate_order(order_id, order.status, to, caller.user_id)?
            == 0
        {
            return Err(self.stale_transition(order_id, to));
        }
        info!(
            "event=order_moderate module=order status=ok order_id={} to={} moderator_id={}",
            order_id,
            to.as_str(),
            caller.user_id
        );
        self.reload(order_id)
    }

    /// Loads a visible order and applies the access policy for `operation`.
    fn load_for(
        &self,
        caller: &Caller,
        order_id: OrderId,
        operation: Operation,
    ) -> Result<CalculationOrder, OrderServiceError> {
        let not_found = OrderServiceError::NotFound {
            kind: EntityKind::Order,
            id: order_id,
        };
        let Some(order) = self.repo.get_order(order_id)? else {
            return Err(not_found);
        };

        let resource = Resource::Order {
            client_id: order.client_id,
        };
        match check_access(caller, operation, resource) {
            AccessDecision::Allow => Ok(order),
            AccessDecision::Deny(DenyReason::NotOwner) => Err(not_found),
            AccessDecision::Deny(DenyReason::ModeratorRequired) => {
                Err(OrderServiceError::Forbidden(operation))
            }
        }
    }

    fn reload(&self, order_id: OrderId) -> Result<CalculationOrder, OrderServiceError> {
        self.repo
            .get_order(order_id)?
            .ok_or(OrderServiceError::NotFound {
                kind: EntityKind::Order,
                id: order_id,
            })
    }

    /// Builds the error for a conditional update that matched no row because
    /// the order changed underneath us.
    fn stale_transition(&self, order_id: OrderId, to: OrderStatus) -> OrderServiceError {
        match self.repo.get_order(order_id) {
            Ok(Some(current)) => OrderServiceError::InvalidTransition {
                order_id,
                from: current.status,
                to,
            },
            Ok(None) => OrderServiceError::NotFound {
                kind: EntityKind::Order,
                id: order_id,
            },
            Err(err) => err.into(),
        }
    }
}

fn ensure_transition(order: &CalculationOrder, to: OrderStatus) -> Result<(), OrderServiceError> {
    if order.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderServiceError::InvalidTransition {
            order_id: order.id,
            from: order.status,
            to,
        })
    }
}
