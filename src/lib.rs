#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Leadflow Core
//!
//! Lead allocation and delivery lifecycle engine.
//!
//! ## Overview
//!
//! Leadflow distributes incoming sales leads to paying clients under
//! contractual constraints: weekly quotas, geographic coverage, product
//! type, backlog-percentage caps, and priority ordering. Every delivered
//! unit is tracked through a strict lifecycle with 30-day per-client
//! duplicate suppression and full auditability.
//!
//! ## Architecture
//!
//! A scheduled trigger runs once per business entity per day. The
//! [`classifier`] promotes aged and already-delivered leads to the Backlog
//! pool, the [`allocation`] engine walks active orders in priority order
//! running three matching passes (Fresh, never-delivered Backlog,
//! expired-window Backlog), and the [`packager`](crate::packager) builds
//! one export per matched order and drives it through the delivery
//! [`state_machine`] to `sent` or `failed`. Leads the home entity cannot
//! absorb are offered to the sibling entity by the cross-entity fallback
//! resolver.
//!
//! ## Module Organization
//!
//! - [`models`] - Leads, orders, deliveries, run reports
//! - [`storage`] - Store contracts plus PostgreSQL and in-memory backends
//! - [`classifier`] - Fresh/Backlog classification and the promotion sweep
//! - [`dedup`] - 30-day per-(phone, product, client) duplicate oracle
//! - [`allocation`] - Order selection, three-pass matching, fallback
//! - [`state_machine`] - Delivery status and outcome transitions
//! - [`packager`] - Export building and transport hand-off
//! - [`export`] / [`transport`] - Entity CSV schemas and the send seam
//! - [`events`] - Lifecycle event broadcasting
//! - [`config`] / [`error`] / [`logging`] - Ambient plumbing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use leadflow_core::config::LeadflowConfig;
//! use leadflow_core::storage::MemoryStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LeadflowConfig::from_env()?;
//! let store = MemoryStore::new();
//!
//! println!("cross-entity fallback enabled: {}", config.cross_entity_enabled);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

pub mod allocation;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod error;
pub mod events;
pub mod export;
pub mod logging;
pub mod models;
pub mod packager;
pub mod state_machine;
pub mod storage;
pub mod transport;

pub use allocation::{AllocationEngine, CrossEntityFallback, OrderSelector, RouteOutcome};
pub use classifier::{classify, LeadClassifier, PoolAssignment};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LeadflowConfig;
pub use dedup::DuplicateOracle;
pub use error::{LeadflowError, Result};
pub use packager::DeliveryPackager;
pub use state_machine::{DeliveryStateMachine, StateMachineError};
