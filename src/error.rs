//! # Crate-Level Error Types
//!
//! Top-level error taxonomy. Storage and state-machine layers carry their
//! own structured errors; this enum is the surface embedders see. It keeps
//! the error classes distinct: transient I/O, constraint violations,
//! data-quality problems, and configuration faults.

use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::StateMachineError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum LeadflowError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("state transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("allocation error: {message}")]
    Allocation { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("export error: {message}")]
    Export { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    /// Transport confirmed the hand-off but the `sent` write failed. The
    /// leads physically left the system, so callers must NOT make them
    /// re-routable; the delivery needs manual reconciliation.
    #[error("delivery {delivery_id} handed off but not recorded as sent: {message}")]
    DeliveredUnrecorded { delivery_id: Uuid, message: String },
}

impl LeadflowError {
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LeadflowError>;
