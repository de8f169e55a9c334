//! Common types module for the payment relayer system.
//!
//! This module defines the core data types and structures used throughout
//! the relayer. It provides a centralized location for shared types to
//! ensure consistency across all relayer components.

/// Audit trail types for recording state-machine transitions.
pub mod audit;
/// Payment authorization types and lifecycle statuses.
pub mod authorization;
/// Batch payment and payment item types.
pub mod batch;
/// Cross-chain transfer types and statuses.
pub mod crosschain;
/// Idempotency record types for request deduplication.
pub mod idempotency;
/// Nonce key types for replay protection.
pub mod nonce;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions shared across crates.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use audit::*;
pub use authorization::*;
pub use batch::*;
pub use crosschain::*;
pub use idempotency::*;
pub use nonce::*;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
