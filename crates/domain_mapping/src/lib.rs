//! Field Mapping Domain
//!
//! This crate defines the canonical business entities and translates them
//! to and from CRM-specific payloads.
//!
//! # Rule layering
//!
//! Every `(crm_system, entity_type)` pair has a default rule set. A tenant
//! may override individual fields; resolution applies defaults first and
//! tenant rules after, and the last rule for a canonical field wins.
//!
//! ```text
//!   defaults(hubspot, company)     tenant overrides
//!   name     -> name               name -> legal_name
//!   domain   -> domain
//!                  \                 /
//!                   resolve_rules(..)
//!                          |
//!                   name   -> legal_name
//!                   domain -> domain
//! ```
//!
//! # Null handling
//!
//! A canonical field with no value is left out of the payload so the CRM
//! keeps whatever it has. A rule marked `SendNullOnClear` sends an explicit
//! null instead.

pub mod defaults;
pub mod engine;
pub mod entity;
pub mod error;
pub mod ports;
pub mod rule;

pub use defaults::builtin_default_rules;
pub use engine::{build_payload_with_rules, parse_inbound_with_rules, CrmPayload, MappingEngine};
pub use entity::{CanonicalEntity, Company, Contact, Opportunity, PartialUpdate, PostalAddress};
pub use error::MappingError;
pub use ports::{BuiltinRuleStore, MappingRuleStore};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::InMemoryRuleStore;
pub use rule::{resolve_rules, MappingDirection, MappingRule, NullPolicy, ResolvedRuleSet, RuleScope};
