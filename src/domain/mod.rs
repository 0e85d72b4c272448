//! Domain layer - pure business logic with no I/O.
//!
//! This layer contains the core concepts and invariants of attribution:
//! - The whitelist of recognized UTM parameters
//! - Attribution strategies and their write decisions
//! - The attribution policy (strategy, lifetime, scope)
//! - Stored entries and their cookie-line wire form
//!
//! All types in this layer are pure and easily testable.

pub mod entry;
pub mod parameter;
pub mod policy;
pub mod strategy;
