//! State machine error types, kept distinct from I/O errors so callers can
//! tell a constraint violation from a transient storage failure.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{DeliveryOutcome, DeliveryStatus};
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum StateMachineError {
    /// The requested transition is not part of the lifecycle graph.
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: DeliveryStatus, event: String },

    /// The optimistic precondition failed: the persisted status no longer
    /// matches what this process observed. A concurrent writer won.
    #[error("stale state for delivery {delivery_id}: expected {expected}")]
    StalePrecondition {
        delivery_id: Uuid,
        expected: DeliveryStatus,
    },

    /// Outcome transitions are only legal from status `sent`.
    #[error("outcome {requested} requires status sent, delivery {delivery_id} is {status}")]
    OutcomeNotAllowed {
        delivery_id: Uuid,
        status: DeliveryStatus,
        requested: DeliveryOutcome,
    },

    /// Rejected and removed are mutually exclusive terminal outcomes.
    #[error("delivery {delivery_id} already has terminal outcome {current}, cannot apply {requested}")]
    OutcomeConflict {
        delivery_id: Uuid,
        current: DeliveryOutcome,
        requested: DeliveryOutcome,
    },

    #[error("delivery {delivery_id} not found")]
    DeliveryNotFound { delivery_id: Uuid },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StateMachineResult<T> = std::result::Result<T, StateMachineError>;
