//! Domain model for isotope reference data and calculation orders.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own field-level validation shared by repositories and services.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Orders are never hard-deleted; `OrderStatus::Deleted` is a tombstone.

pub mod isotope;
pub mod order;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field-level validation failure for domain input.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Text field is blank after trim.
    BlankField(&'static str),
    /// Numeric field is NaN or infinite.
    NotFinite { field: &'static str, value: f64 },
    /// Numeric field must be strictly positive.
    NotPositive { field: &'static str, value: f64 },
    /// Numeric field must not be negative.
    Negative { field: &'static str, value: f64 },
    /// Image reference is not an absolute http(s) URL.
    InvalidImageUrl(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
            Self::NotFinite { field, value } => write!(f, "{field} must be finite, got {value}"),
            Self::NotPositive { field, value } => {
                write!(f, "{field} must be greater than zero, got {value}")
            }
            Self::Negative { field, value } => {
                write!(f, "{field} must not be negative, got {value}")
            }
            Self::InvalidImageUrl(value) => write!(f, "invalid image url `{value}`"),
        }
    }
}

impl Error for ValidationError {}

/// Ensures `value` is finite and strictly positive.
pub fn require_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    if value <= 0.0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(value)
}

/// Ensures `value` is finite and not negative.
pub fn require_non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{require_non_negative, require_positive, ValidationError};

    #[test]
    fn positive_rejects_zero_negative_and_nan() {
        assert!(matches!(
            require_positive("mass", 0.0),
            Err(ValidationError::NotPositive { .. })
        ));
        assert!(matches!(
            require_positive("mass", -5.0),
            Err(ValidationError::NotPositive { .. })
        ));
        assert!(matches!(
            require_positive("mass", f64::NAN),
            Err(ValidationError::NotFinite { .. })
        ));
        assert_eq!(require_positive("mass", 2.5), Ok(2.5));
    }

    #[test]
    fn non_negative_accepts_zero() {
        assert_eq!(require_non_negative("time", 0.0), Ok(0.0));
        assert!(matches!(
            require_non_negative("time", -0.1),
            Err(ValidationError::Negative { .. })
        ));
        assert!(matches!(
            require_non_negative("time", f64::INFINITY),
            Err(ValidationError::NotFinite { .. })
        ));
    }
}
