//! Nonce key types for replay protection.
//!
//! Nonces are scoped per (owner, token, chain). The ledger keeps a
//! monotonic counter per key for allocation and a separate unique set of
//! consumed nonces as the authoritative replay guard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one nonce sequence: an owner's authorizations for a token
/// on a chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NonceKey {
	/// Identifier of the signing owner.
	pub owner_id: String,
	/// Address of the token the authorizations move.
	pub token_address: String,
	/// Chain the authorizations settle on.
	pub chain_id: u64,
}

impl NonceKey {
	pub fn new(
		owner_id: impl Into<String>,
		token_address: impl Into<String>,
		chain_id: u64,
	) -> Self {
		Self {
			owner_id: owner_id.into(),
			token_address: token_address.into(),
			chain_id,
		}
	}

	/// Storage identifier for the counter record of this key.
	pub fn counter_id(&self) -> String {
		format!("{}:{}:{}", self.owner_id, self.token_address, self.chain_id)
	}

	/// Storage identifier for the consumed-nonce record of one nonce.
	pub fn used_id(&self, nonce: u64) -> String {
		format!("{}:{}", self.counter_id(), nonce)
	}
}

impl fmt::Display for NonceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.counter_id())
	}
}

/// Record inserted once a nonce has been consumed.
///
/// Existence of this record is the replay-prevention fact; it is written
/// once, behind a uniqueness constraint, and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsedNonce {
	/// The nonce sequence this consumption belongs to.
	#[serde(flatten)]
	pub key: NonceKey,
	/// The consumed nonce value.
	pub nonce: u64,
	/// Timestamp when the nonce was consumed.
	pub consumed_at: u64,
}
