//! CRM system and entity type tags
//!
//! These tags key every piece of per-CRM state in the engine: mapping rules,
//! client registrations, idempotency records and entity links. Their wire
//! form (`as_str`) is what gets persisted, so it must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// External CRM systems the engine can synchronize with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmSystem {
    #[serde(rename = "hubspot")]
    HubSpot,
    Salesforce,
    Pipedrive,
    #[serde(rename = "sap_b1")]
    SapB1,
}

impl CrmSystem {
    /// All supported systems, in a stable order
    pub const ALL: [CrmSystem; 4] = [
        CrmSystem::HubSpot,
        CrmSystem::Salesforce,
        CrmSystem::Pipedrive,
        CrmSystem::SapB1,
    ];

    /// Returns the persisted tag for this system
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmSystem::HubSpot => "hubspot",
            CrmSystem::Salesforce => "salesforce",
            CrmSystem::Pipedrive => "pipedrive",
            CrmSystem::SapB1 => "sap_b1",
        }
    }
}

impl fmt::Display for CrmSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrmSystem {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hubspot" => Ok(CrmSystem::HubSpot),
            "salesforce" => Ok(CrmSystem::Salesforce),
            "pipedrive" => Ok(CrmSystem::Pipedrive),
            "sap_b1" | "sapb1" => Ok(CrmSystem::SapB1),
            other => Err(CoreError::unknown_tag("crm system", other)),
        }
    }
}

/// Kinds of business object the engine synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    Contact,
    Opportunity,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::Company,
        EntityType::Contact,
        EntityType::Opportunity,
    ];

    /// Returns the persisted tag for this entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Contact => "contact",
            EntityType::Opportunity => "opportunity",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" | "account" => Ok(EntityType::Company),
            "contact" => Ok(EntityType::Contact),
            "opportunity" | "deal" => Ok(EntityType::Opportunity),
            other => Err(CoreError::unknown_tag("entity type", other)),
        }
    }
}
