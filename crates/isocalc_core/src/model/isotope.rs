//! Isotope reference data.
//!
//! # Responsibility
//! - Define the catalog record used by decay calculations.
//! - Validate moderator-supplied catalog input.
//!
//! # Invariants
//! - `half_life_years` is finite and strictly positive.
//! - `image_url`, when set, is an absolute http(s) URL. The blob itself lives
//!   in external object storage.

use crate::model::{require_positive, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static IMAGE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid image url regex"));

/// Stable identifier for catalog isotopes.
pub type IsotopeId = Uuid;

/// Catalog entry for one radioactive isotope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isotope {
    pub id: IsotopeId,
    pub name: String,
    pub description: String,
    /// Half-life in years.
    pub half_life_years: f64,
    pub atomic_mass: f64,
    /// Free-form label such as `beta-` or `alpha`.
    pub decay_type: String,
    pub application: String,
    pub image_url: Option<String>,
    /// Inactive isotopes stay resolvable by id but are hidden from the
    /// catalog and cannot be added to drafts.
    pub is_active: bool,
}

/// Moderator input for creating or replacing an isotope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotopeDraft {
    pub name: String,
    pub description: String,
    pub half_life_years: f64,
    pub atomic_mass: f64,
    pub decay_type: String,
    pub application: String,
    pub image_url: Option<String>,
}

impl IsotopeDraft {
    /// Creates input with required physical fields and empty text fields.
    pub fn new(name: impl Into<String>, half_life_years: f64, atomic_mass: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            half_life_years,
            atomic_mass,
            decay_type: String::new(),
            application: String::new(),
            image_url: None,
        }
    }

    /// Returns a normalized copy or the first failing field.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankField("name"));
        }
        let half_life_years = require_positive("half_life_years", self.half_life_years)?;
        let atomic_mass = require_positive("atomic_mass", self.atomic_mass)?;

        let image_url = match self.image_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(url) if IMAGE_URL_RE.is_match(url) => Some(url.to_string()),
            Some(url) => return Err(ValidationError::InvalidImageUrl(url.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            half_life_years,
            atomic_mass,
            decay_type: self.decay_type.trim().to_string(),
            application: self.application.trim().to_string(),
            image_url,
        })
    }

    /// Builds an active catalog record with a fresh id.
    pub fn into_isotope(self) -> Isotope {
        Isotope {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            half_life_years: self.half_life_years,
            atomic_mass: self.atomic_mass,
            decay_type: self.decay_type,
            application: self.application,
            image_url: self.image_url,
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IsotopeDraft;
    use crate::model::ValidationError;

    #[test]
    fn validated_trims_text_and_drops_blank_image() {
        let mut draft = IsotopeDraft::new("  Carbon-14 ", 5730.0, 14.003);
        draft.image_url = Some("   ".to_string());
        let normalized = draft.validated().expect("valid draft");
        assert_eq!(normalized.name, "Carbon-14");
        assert_eq!(normalized.image_url, None);
    }

    #[test]
    fn validated_rejects_non_positive_half_life() {
        let draft = IsotopeDraft::new("Broken", 0.0, 1.0);
        assert!(matches!(
            draft.validated(),
            Err(ValidationError::NotPositive {
                field: "half_life_years",
                ..
            })
        ));
    }

    #[test]
    fn validated_checks_image_url_scheme() {
        let mut draft = IsotopeDraft::new("Cobalt-60", 5.27, 59.93);
        draft.image_url = Some("ftp://minio/isotopes/co60.png".to_string());
        assert!(matches!(
            draft.validated(),
            Err(ValidationError::InvalidImageUrl(_))
        ));

        draft.image_url = Some("http://localhost:9000/isotopes/co60.png".to_string());
        assert!(draft.validated().is_ok());
    }
}
