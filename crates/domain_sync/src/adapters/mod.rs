//! Client decorators
//!
//! Wrappers that add cross-cutting behavior to any `CrmClient` without the
//! concrete clients knowing about it.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreakingClient, CIRCUIT_OPEN};
