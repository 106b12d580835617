//! Environment-driven configuration.

use crate::error::{LeadflowError, Result};
use crate::models::BusinessEntity;

#[derive(Debug, Clone)]
pub struct LeadflowConfig {
    pub database_url: String,
    /// Global switch for the cross-entity fallback resolver.
    pub cross_entity_enabled: bool,
    /// Per-entity switches, both on by default.
    pub cross_entity_entity_a: bool,
    pub cross_entity_entity_b: bool,
    /// Hour of day (UTC) the external scheduler fires the daily run.
    pub schedule_hour_utc: u8,
    /// Fixed UTC offset (hours) the Monday week anchor is computed in.
    pub week_anchor_offset_hours: i32,
    pub event_channel_capacity: usize,
}

impl Default for LeadflowConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/leadflow_development".to_string(),
            cross_entity_enabled: true,
            cross_entity_entity_a: true,
            cross_entity_entity_b: true,
            schedule_hour_utc: 6,
            week_anchor_offset_hours: 0,
            event_channel_capacity: 1000,
        }
    }
}

impl LeadflowConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(enabled) = std::env::var("LEADFLOW_CROSS_ENTITY_ENABLED") {
            config.cross_entity_enabled = enabled.parse().map_err(|e| {
                LeadflowError::configuration(format!("Invalid cross_entity_enabled: {e}"))
            })?;
        }

        if let Ok(hour) = std::env::var("LEADFLOW_SCHEDULE_HOUR_UTC") {
            config.schedule_hour_utc = hour.parse().map_err(|e| {
                LeadflowError::configuration(format!("Invalid schedule_hour_utc: {e}"))
            })?;
        }

        if let Ok(offset) = std::env::var("LEADFLOW_WEEK_ANCHOR_OFFSET_HOURS") {
            config.week_anchor_offset_hours = offset.parse().map_err(|e| {
                LeadflowError::configuration(format!("Invalid week_anchor_offset_hours: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Whether cross-entity fallback may fire for leads homed in `entity`.
    pub fn cross_entity_enabled_for(&self, entity: BusinessEntity) -> bool {
        self.cross_entity_enabled
            && match entity {
                BusinessEntity::EntityA => self.cross_entity_entity_a,
                BusinessEntity::EntityB => self.cross_entity_entity_b,
            }
    }
}
