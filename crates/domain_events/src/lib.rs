//! Domain Events
//!
//! This crate holds the immutable domain event records produced when a
//! canonical entity changes, and the in-process bus that fans those events
//! out to subscribed handlers.
//!
//! # Delivery model
//!
//! Delivery is in-process and best-effort. The bus keeps no copy of an event
//! once dispatch has finished; the entity in storage stays the source of
//! truth and an event is only a trigger.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_events::{DomainEvent, EventBus};
//!
//! let bus = EventBus::new();
//! bus.subscribe(DomainEvent::COMPANY_UPDATED, handler);
//!
//! let report = bus.publish(&DomainEvent::company_updated(tenant_id, company_id)).await;
//! assert!(report.is_clean());
//! ```

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{extract_panic_message, EventBus, EventHandler, HandlerFailure, PublishReport, Subscription};
pub use error::HandlerError;
pub use event::{DomainEvent, EventPayload};
