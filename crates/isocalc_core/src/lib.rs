//! Core domain logic for the isotope decay calculator.
//! This crate is the single source of truth for decay math and order
//! lifecycle invariants.

pub mod access;
pub mod db;
pub mod decay;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use access::{check_access, AccessDecision, Caller, DenyReason, Operation, Resource};
pub use decay::{checked_remaining_activity, remaining_activity, DecayInputError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::isotope::{Isotope, IsotopeDraft, IsotopeId};
pub use model::order::{
    AddItemOutcome, CalculationItem, CalculationOrder, DraftSummary, ItemId, ItemMassUpdate,
    OrderDetail, OrderId, OrderItemView, OrderStatus, UserId, DEFAULT_INITIAL_MASS_GRAMS,
};
pub use model::ValidationError;
pub use repo::isotope_repo::{IsotopeListQuery, IsotopeRepository, SqliteIsotopeRepository};
pub use repo::order_repo::{OrderListQuery, OrderRepository, SqliteOrderRepository};
pub use repo::{EntityKind, RepoError, RepoResult};
pub use service::catalog_service::{CatalogService, CatalogServiceError};
pub use service::order_service::{OrderService, OrderServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
