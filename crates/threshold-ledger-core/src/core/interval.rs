// crates/threshold-ledger-core/src/core/interval.rs
// ============================================================================
// Module: Effective Intervals
// Description: Inclusive date intervals scoping override validity.
// Purpose: Provide validated containment and overlap checks for overrides.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Overrides are scoped by an inclusive `[effective, expiry]` date interval
//! where a missing expiry means open-ended. The non-overlap invariant for a
//! `(deal, test)` key is expressed entirely through [`EffectiveInterval`]:
//! stores accept a new override only if its interval overlaps none of the
//! existing intervals for the same key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Interval construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// Expiry date precedes the effective date.
    #[error("interval inverted: effective {effective} is after expiry {expiry}")]
    Inverted {
        /// Inclusive effective date.
        effective: Date,
        /// Inclusive expiry date.
        expiry: Date,
    },
}

// ============================================================================
// SECTION: Interval
// ============================================================================

/// Inclusive validity interval of a threshold override.
///
/// # Invariants
/// - `effective <= expiry` whenever `expiry` is present.
/// - `expiry == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveInterval {
    /// Inclusive start of validity.
    pub effective: Date,
    /// Inclusive end of validity; `None` means open-ended.
    pub expiry: Option<Date>,
}

impl EffectiveInterval {
    /// Creates a validated interval.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::Inverted`] when `expiry` precedes `effective`.
    pub fn new(effective: Date, expiry: Option<Date>) -> Result<Self, IntervalError> {
        if let Some(expiry) = expiry
            && expiry < effective
        {
            return Err(IntervalError::Inverted {
                effective,
                expiry,
            });
        }
        Ok(Self {
            effective,
            expiry,
        })
    }

    /// Creates an open-ended interval starting at `effective`.
    #[must_use]
    pub const fn open_ended(effective: Date) -> Self {
        Self {
            effective,
            expiry: None,
        }
    }

    /// Returns true when the interval contains `date` (inclusive bounds).
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        if date < self.effective {
            return false;
        }
        match self.expiry {
            Some(expiry) => date <= expiry,
            None => true,
        }
    }

    /// Returns true when two intervals share at least one date.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let starts_before_other_ends = match other.expiry {
            Some(expiry) => self.effective <= expiry,
            None => true,
        };
        let other_starts_before_self_ends = match self.expiry {
            Some(expiry) => other.effective <= expiry,
            None => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }
}

impl fmt::Display for EffectiveInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expiry {
            Some(expiry) => write!(f, "[{}, {}]", self.effective, expiry),
            None => write!(f, "[{}, open)", self.effective),
        }
    }
}
