//! Radioactive decay engine.
//!
//! Implements the exponential decay law `A(t) = A0 * (1/2)^(t / T)`.
//!
//! # Invariants
//! - `remaining_activity` is pure and assumes `T > 0`, `A0 > 0`, `t >= 0`.
//! - `t == 0` returns `A0` exactly.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Computes residual activity after `elapsed_years`.
///
/// Inputs outside the valid domain are not checked; use
/// [`checked_remaining_activity`] at trust boundaries.
pub fn remaining_activity(half_life_years: f64, initial_amount: f64, elapsed_years: f64) -> f64 {
    if elapsed_years == 0.0 {
        return initial_amount;
    }
    initial_amount * 0.5_f64.powf(elapsed_years / half_life_years)
}

/// Input domain violation for the decay law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayInputError {
    HalfLife(f64),
    InitialAmount(f64),
    Elapsed(f64),
}

impl Display for DecayInputError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HalfLife(value) => write!(f, "half-life must be finite and > 0, got {value}"),
            Self::InitialAmount(value) => {
                write!(f, "initial amount must be finite and > 0, got {value}")
            }
            Self::Elapsed(value) => write!(f, "elapsed time must be finite and >= 0, got {value}"),
        }
    }
}

impl Error for DecayInputError {}

/// Domain-checked variant of [`remaining_activity`].
pub fn checked_remaining_activity(
    half_life_years: f64,
    initial_amount: f64,
    elapsed_years: f64,
) -> Result<f64, DecayInputError> {
    if !half_life_years.is_finite() || half_life_years <= 0.0 {
        return Err(DecayInputError::HalfLife(half_life_years));
    }
    if !initial_amount.is_finite() || initial_amount <= 0.0 {
        return Err(DecayInputError::InitialAmount(initial_amount));
    }
    if !elapsed_years.is_finite() || elapsed_years < 0.0 {
        return Err(DecayInputError::Elapsed(elapsed_years));
    }
    Ok(remaining_activity(
        half_life_years,
        initial_amount,
        elapsed_years,
    ))
}
