//! Transport collaborator contract and the test double used by the
//! integration suites. The production transport (SMTP relay, S3 drop,
//! webhook) lives in the embedding service.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{LeadflowError, Result};

/// One outbound send of an export artifact.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to_addresses: Vec<String>,
    pub payload: String,
    pub filename: String,
    pub metadata: Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand the artifact off. `Ok(())` means the collaborator confirmed the
    /// hand-off; anything else surfaces as a `failed` delivery transition.
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Records sends instead of performing them; can be primed to fail a
/// number of times to exercise the retry path.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failures_remaining: Arc<Mutex<u32>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with a transport error.
    pub async fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock().await = count;
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let mut failures = self.failures_remaining.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(LeadflowError::transport("simulated transport outage"));
        }
        drop(failures);

        self.sent.lock().await.push(message);
        Ok(())
    }
}
