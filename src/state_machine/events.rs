use serde::{Deserialize, Serialize};

/// Events driving the delivery status dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// Export built: `pending_csv -> ready_to_send`.
    MarkReady,
    /// Hand-off to transport starting: `ready_to_send -> sending`, or
    /// `failed -> sending` on retry.
    BeginSend,
    /// Transport confirmed success: `sending -> sent`.
    ConfirmSent,
    /// Transport failed: `sending -> failed`, storing the error detail.
    Fail(String),
}

impl DeliveryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarkReady => "mark_ready",
            Self::BeginSend => "begin_send",
            Self::ConfirmSent => "confirm_sent",
            Self::Fail(_) => "fail",
        }
    }
}
