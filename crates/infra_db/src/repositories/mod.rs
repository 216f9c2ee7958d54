//! Repository implementations
//!
//! One repository per table. Repositories speak in rows and
//! `DatabaseError`; the adapters turn them into domain values and port
//! errors.

pub mod connections;
pub mod entity_links;
pub mod field_mappings;
pub mod webhook_events;

pub use connections::{ConnectionRepository, ConnectionRow};
pub use entity_links::{EntityLinkRepository, EntityLinkRow};
pub use field_mappings::{FieldMappingRepository, FieldMappingRow};
pub use webhook_events::{WebhookEventRepository, WebhookEventRow};
