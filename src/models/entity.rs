use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two isolated tenants sharing the platform.
///
/// Leads and orders belong to exactly one entity; the cross-entity fallback
/// resolver is the only component that crosses this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessEntity {
    EntityA,
    EntityB,
}

impl BusinessEntity {
    /// The other tenant, searched by the cross-entity fallback resolver.
    pub fn sibling(self) -> Self {
        match self {
            Self::EntityA => Self::EntityB,
            Self::EntityB => Self::EntityA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntityA => "entity_a",
            Self::EntityB => "entity_b",
        }
    }
}

impl fmt::Display for BusinessEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BusinessEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity_a" => Ok(Self::EntityA),
            "entity_b" => Ok(Self::EntityB),
            _ => Err(format!("Invalid business entity: {s}")),
        }
    }
}
