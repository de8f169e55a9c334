//! Nonce ledger: replay protection for signed payment authorizations.
//!
//! Two separate facts are tracked per (owner, token, chain) key. The
//! counter is an optimistic allocator: a single atomic create-or-increment
//! hands out distinct, ordered values to concurrent callers. The used-set
//! is the strict source of truth: consuming a nonce inserts a row behind a
//! uniqueness constraint, and that insert failing is what rejects a
//! replay. Counter advancement alone is never treated as proof of
//! non-replay.

use relayer_storage::{StorageError, StorageService};
use relayer_types::{current_timestamp, NonceKey, StorageKey, UsedNonce};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during nonce operations.
#[derive(Debug, Error)]
pub enum NonceError {
	/// The nonce has already been consumed; this is a replay attempt.
	#[error("Nonce {nonce} for {key} has already been used")]
	DuplicateNonce { key: String, nonce: u64 },
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for NonceError {
	fn from(e: StorageError) -> Self {
		NonceError::Storage(e.to_string())
	}
}

/// Per-(owner, token, chain) nonce allocation and consumption.
pub struct NonceLedger {
	storage: Arc<StorageService>,
}

impl NonceLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Returns the current counter value without side effects.
	///
	/// 0 means no nonce has been allocated for this key yet.
	pub async fn current_nonce(&self, key: &NonceKey) -> Result<u64, NonceError> {
		Ok(self
			.storage
			.counter(StorageKey::NonceCounters.as_str(), &key.counter_id())
			.await?)
	}

	/// Allocates the next nonce for the key and returns it.
	///
	/// Backed by a single atomic create-or-increment, so concurrent calls
	/// for the same key always receive distinct, contiguous values.
	pub async fn increment_nonce(&self, key: &NonceKey) -> Result<u64, NonceError> {
		let nonce = self
			.storage
			.increment(StorageKey::NonceCounters.as_str(), &key.counter_id())
			.await?;
		tracing::debug!(key = %key, nonce, "Allocated nonce");
		Ok(nonce)
	}

	/// Consumes a nonce, inserting its used-row under the uniqueness
	/// constraint.
	///
	/// Exactly one of any number of concurrent attempts for the same
	/// (key, nonce) succeeds; the rest fail with
	/// [`NonceError::DuplicateNonce`].
	pub async fn mark_nonce_used(&self, key: &NonceKey, nonce: u64) -> Result<(), NonceError> {
		let used = UsedNonce {
			key: key.clone(),
			nonce,
			consumed_at: current_timestamp(),
		};

		match self
			.storage
			.insert(
				StorageKey::UsedNonces.as_str(),
				&key.used_id(nonce),
				&used,
				None,
			)
			.await
		{
			Ok(()) => Ok(()),
			Err(StorageError::AlreadyExists) => Err(NonceError::DuplicateNonce {
				key: key.counter_id(),
				nonce,
			}),
			Err(e) => Err(e.into()),
		}
	}

	/// Returns whether a nonce has been consumed.
	pub async fn is_nonce_used(&self, key: &NonceKey, nonce: u64) -> Result<bool, NonceError> {
		Ok(self
			.storage
			.exists(StorageKey::UsedNonces.as_str(), &key.used_id(nonce))
			.await?)
	}
}
