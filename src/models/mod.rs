//! Typed records for the allocation core.
//!
//! The source of truth for leads, orders, deliveries, and run reports,
//! with required vs optional fields made explicit and validated at the
//! storage boundary rather than scattered through business logic.

pub mod delivery;
pub mod entity;
pub mod lead;
pub mod order;
pub mod run_report;

pub use delivery::{Delivery, DeliveryMethod, DeliveryOutcome, DeliveryStatus, NewDelivery};
pub use entity::BusinessEntity;
pub use lead::{BacklogReason, FreshnessTag, Lead, LeadSource, LeadStatus, NewLead};
pub use order::{ActiveOrder, ClientInfo, DepartmentCoverage, Order};
pub use run_report::RunReport;
