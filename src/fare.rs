// 💶 Fare Calculator
//
// price = billable hours × hourly rate of the category
//   - stays of 30 minutes or less are free
//   - recurring users get 5% off the billable duration
//
// No rounding happens here; formatting to cents is up to the caller.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::{Ticket, VehicleCategory};

// ============================================================================
// RATES
// ============================================================================

pub const CAR_RATE_PER_HOUR: f64 = 1.5;
pub const BIKE_RATE_PER_HOUR: f64 = 1.0;

/// Grace period, in hours
pub const FREE_TIME_HOURS: f64 = 0.5;

pub const RECURRING_USER_DISCOUNT_RATE: f64 = 0.05;

pub const MILLISECONDS_PER_HOUR: f64 = 3_600_000.0;

impl VehicleCategory {
    /// Hourly rate for this category
    pub fn hourly_rate(&self) -> f64 {
        match self {
            VehicleCategory::Car => CAR_RATE_PER_HOUR,
            VehicleCategory::Bike => BIKE_RATE_PER_HOUR,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FareError {
    #[error("invalid stay interval: {0}")]
    InvalidInterval(String),

    #[error("unknown vehicle category '{0}'")]
    UnknownCategory(String),
}

// ============================================================================
// COMPUTATION
// ============================================================================

/// Compute the price of a stay.
///
/// Fails with `InvalidInterval` when `exit_time` is missing or earlier than
/// `entry_time`. Everything else is trusted.
pub fn compute_fare(
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
    category: VehicleCategory,
    discount: bool,
) -> Result<f64, FareError> {
    let exit_time = exit_time
        .ok_or_else(|| FareError::InvalidInterval("exit time is missing".to_string()))?;

    if exit_time < entry_time {
        return Err(FareError::InvalidInterval(format!(
            "exit time {} precedes entry time {}",
            exit_time.to_rfc3339(),
            entry_time.to_rfc3339()
        )));
    }

    let mut duration_hours =
        (exit_time - entry_time).num_milliseconds() as f64 / MILLISECONDS_PER_HOUR;

    if duration_hours <= FREE_TIME_HOURS {
        duration_hours = 0.0;
    }

    if discount {
        duration_hours *= 1.0 - RECURRING_USER_DISCOUNT_RATE;
    }

    Ok(duration_hours * category.hourly_rate())
}

/// Stateless calculator over tickets
#[derive(Debug, Clone, Copy, Default)]
pub struct FareCalculator;

impl FareCalculator {
    pub fn new() -> Self {
        FareCalculator
    }

    /// Price for a ticket using its own entry/exit times, spot category and discount flag
    pub fn fare_for(&self, ticket: &Ticket) -> Result<f64, FareError> {
        compute_fare(
            ticket.entry_time,
            ticket.exit_time,
            ticket.spot.category,
            ticket.discount,
        )
    }
}
