//! Isotope catalog use-case service.
//!
//! # Responsibility
//! - Serve catalog reads to every caller.
//! - Gate catalog writes behind moderator capability.
//!
//! # Invariants
//! - Inactive isotopes are left out of listings for non-moderators but stay
//!   resolvable by id, so existing orders can still show them.

use crate::access::{check_access, Caller, Operation, Resource};
use crate::model::isotope::{Isotope, IsotopeDraft, IsotopeId};
use crate::model::ValidationError;
use crate::repo::isotope_repo::{IsotopeListQuery, IsotopeRepository};
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from catalog service operations.
#[derive(Debug)]
pub enum CatalogServiceError {
    /// Input failed field validation.
    Validation(ValidationError),
    /// Isotope does not exist.
    IsotopeNotFound(IsotopeId),
    /// Caller lacks the capability for the operation.
    Forbidden(Operation),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for CatalogServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::IsotopeNotFound(id) => write!(f, "isotope not found: {id}"),
            Self::Forbidden(operation) => {
                write!(f, "operation `{}` is not permitted", operation.as_str())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CatalogServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CatalogServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { id, .. } => Self::IsotopeNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Catalog service facade over repository implementations.
pub struct CatalogService<R: IsotopeRepository> {
    repo: R,
}

impl<R: IsotopeRepository> CatalogService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Lists active isotopes ordered by name.
    pub fn list_isotopes(&self) -> RepoResult<Vec<Isotope>> {
        self.repo.list_isotopes(&IsotopeListQuery::default())
    }

    /// Lists every isotope including inactive ones. Moderator only.
    pub fn list_all_isotopes(&self, caller: &Caller) -> Result<Vec<Isotope>, CatalogServiceError> {
        self.authorize(caller, Operation::ManageCatalog)?;
        let query = IsotopeListQuery {
            include_inactive: true,
        };
        Ok(self.repo.list_isotopes(&query)?)
    }

    /// Gets one isotope by id, active or not.
    pub fn get_isotope(&self, id: IsotopeId) -> Result<Isotope, CatalogServiceError> {
        self.repo
            .get_isotope(id)?
            .ok_or(CatalogServiceError::IsotopeNotFound(id))
    }

    /// Adds a new active isotope to the catalog.
    pub fn create_isotope(
        &self,
        caller: &Caller,
        draft: &IsotopeDraft,
    ) -> Result<Isotope, CatalogServiceError> {
        self.authorize(caller, Operation::ManageCatalog)?;
        let isotope = self.repo.create_isotope(draft)?;
        info!(
            "event=isotope_create module=catalog status=ok isotope_id={} moderator_id={}",
            isotope.id, caller.user_id
        );
        Ok(isotope)
    }

    /// Replaces the editable fields of one isotope.
    pub fn update_isotope(
        &self,
        caller: &Caller,
        id: IsotopeId,
        draft: &IsotopeDraft,
    ) -> Result<Isotope, CatalogServiceError> {
        self.authorize(caller, Operation::ManageCatalog)?;
        let isotope = self.repo.update_isotope(id, draft)?;
        info!(
            "event=isotope_update module=catalog status=ok isotope_id={} moderator_id={}",
            id, caller.user_id
        );
        Ok(isotope)
    }

    /// Shows or hides one isotope in the catalog.
    pub fn set_isotope_active(
        &self,
        caller: &Caller,
        id: IsotopeId,
        is_active: bool,
    ) -> Result<(), CatalogServiceError> {
        self.authorize(caller, Operation::ManageCatalog)?;
        self.repo.set_isotope_active(id, is_active)?;
        info!(
            "event=isotope_set_active module=catalog status=ok isotope_id={} is_active={}",
            id, is_active
        );
        Ok(())
    }

    fn authorize(&self, caller: &Caller, operation: Operation) -> Result<(), CatalogServiceError> {
        if check_access(caller, operation, Resource::Catalog).is_allowed() {
            return Ok(());
        }
        warn!(
            "event=access_denied module=catalog status=denied operation={} user_id={}",
            operation.as_str(),
            caller.user_id
        );
        Err(CatalogServiceError::Forbidden(operation))
    }
}
