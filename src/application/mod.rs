//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic:
//! - Attribution engine (validation, strategy evaluation, writes)
//! - Update notifications
//! - Metrics
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod engine;
pub mod metrics;
pub mod notify;
pub mod ports;
