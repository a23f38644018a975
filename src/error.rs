//! Workflow outcomes other than success.
//!
//! Each variant is a distinct outcome so callers can pick their own message.

use thiserror::Error;

use crate::entities::{TicketId, VehicleCategory};
use crate::fare::FareError;

#[derive(Debug, Error)]
pub enum ParkingError {
    /// Caller-supplied data rejected before any store is touched
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no available {0} spot")]
    LotFull(VehicleCategory),

    #[error("no open ticket for vehicle '{0}'")]
    TicketNotFound(String),

    #[error("fare computation failed: {0}")]
    FareComputationFailed(#[source] FareError),

    #[error("unknown vehicle category '{0}'")]
    UnknownCategory(String),

    /// A collaborator answered but reported that nothing was written
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("ticket {0} could not be updated")]
    TicketUpdateFailed(TicketId),

    #[error("unable to process incoming vehicle")]
    EntryFailed(#[source] anyhow::Error),

    #[error("unable to process exiting vehicle")]
    ExitFailed(#[source] anyhow::Error),
}

impl From<FareError> for ParkingError {
    fn from(err: FareError) -> Self {
        match err {
            FareError::UnknownCategory(name) => ParkingError::UnknownCategory(name),
            other => ParkingError::FareComputationFailed(other),
        }
    }
}

pub type ParkingResult<T> = std::result::Result<T, ParkingError>;
