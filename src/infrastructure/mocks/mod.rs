//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod backend;
pub mod clock;
pub mod layer;

pub use backend::{DiscardingBackend, FailingBackend};
pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
