//! Lifecycle event system. Names live in [`crate::constants::events`].

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
