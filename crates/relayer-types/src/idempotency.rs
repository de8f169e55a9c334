//! Idempotency record types for request deduplication.

use serde::{Deserialize, Serialize};

/// Validity window for an idempotency reservation, in seconds.
pub const IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

/// A reserved idempotency key with its optional stored result.
///
/// Purely advisory: losing a record at worst causes a re-execution, never
/// corruption, as long as the reservation itself is race-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
	/// Client-supplied deduplication key.
	pub key: String,
	/// Timestamp when the key was reserved.
	pub created_at: u64,
	/// Timestamp after which the key is treated as absent.
	pub expires_at: u64,
	/// Result of the original request, stored once it completed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
}

/// Outcome of attempting to reserve an idempotency key.
#[derive(Debug, Clone)]
pub struct Reservation {
	/// True when this call reserved the key; false on a duplicate.
	pub fresh: bool,
	/// Stored result of the prior request, when one exists.
	pub existing_result: Option<serde_json::Value>,
}
