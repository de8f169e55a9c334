//! Idempotency store: short-lived request-deduplication keys.
//!
//! Reservations are purely advisory. Losing one at worst causes a
//! re-execution, never corruption, because the reservation itself is a
//! race-free insert-if-absent and all economic effects sit behind the
//! nonce ledger's uniqueness constraint.

use relayer_storage::{StorageError, StorageService};
use relayer_types::{
	current_timestamp, IdempotencyRecord, Reservation, StorageKey, IDEMPOTENCY_TTL_SECS,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during idempotency operations.
#[derive(Debug, Error)]
pub enum IdempotencyError {
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for IdempotencyError {
	fn from(e: StorageError) -> Self {
		IdempotencyError::Storage(e.to_string())
	}
}

/// Deduplicates repeated identical requests within a 24h window.
pub struct IdempotencyStore {
	storage: Arc<StorageService>,
}

impl IdempotencyStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Atomically reserves a key, or reports the prior reservation.
	///
	/// A fresh reservation returns `fresh = true`; a live duplicate
	/// returns `fresh = false` with the stored result of the original
	/// request, if it was recorded. An expired reservation is treated as
	/// absent and re-reserved.
	pub async fn check_and_reserve(&self, key: &str) -> Result<Reservation, IdempotencyError> {
		let namespace = StorageKey::IdempotencyKeys.as_str();
		let ttl = Duration::from_secs(IDEMPOTENCY_TTL_SECS);

		// Two passes cover the race where the prior reservation expires
		// between the failed insert and the follow-up read.
		for _ in 0..2 {
			let now = current_timestamp();
			let record = IdempotencyRecord {
				key: key.to_string(),
				created_at: now,
				expires_at: now + IDEMPOTENCY_TTL_SECS,
				result: None,
			};

			match self.storage.insert(namespace, key, &record, Some(ttl)).await {
				Ok(()) => {
					return Ok(Reservation {
						fresh: true,
						existing_result: None,
					})
				}
				Err(StorageError::AlreadyExists) => {}
				Err(e) => return Err(e.into()),
			}

			let existing: IdempotencyRecord = match self.storage.retrieve(namespace, key).await {
				Ok(existing) => existing,
				// Expired between insert and read; try the insert again.
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e.into()),
			};

			// The record carries its own expiry so the check does not
			// depend on the backend honoring TTLs on rewrite.
			if existing.expires_at <= now {
				self.storage.remove(namespace, key).await?;
				continue;
			}

			return Ok(Reservation {
				fresh: false,
				existing_result: existing.result,
			});
		}

		Err(IdempotencyError::Storage(format!(
			"idempotency reservation for '{}' kept racing expiry",
			key
		)))
	}

	/// Records the result of the original request so duplicates can be
	/// answered without re-execution.
	///
	/// A reservation that lapsed in the meantime is ignored; the worst
	/// case is one re-execution.
	pub async fn store_result(
		&self,
		key: &str,
		result: serde_json::Value,
	) -> Result<(), IdempotencyError> {
		let namespace = StorageKey::IdempotencyKeys.as_str();
		let outcome: Result<IdempotencyRecord, StorageError> = self
			.storage
			.mutate(namespace, key, |record: &mut IdempotencyRecord| {
				record.result = Some(result.clone());
				Ok(())
			})
			.await;

		match outcome {
			Ok(_) => Ok(()),
			Err(StorageError::NotFound) => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	/// Deletes expired reservations; returns how many were removed.
	///
	/// Pure garbage collection. Running it late never affects
	/// correctness, but it bounds storage growth.
	pub async fn clean_expired(&self) -> Result<usize, IdempotencyError> {
		Ok(self.storage.cleanup_expired().await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relayer_storage::implementations::memory::MemoryStorage;

	fn store() -> IdempotencyStore {
		IdempotencyStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn store_with_storage() -> (IdempotencyStore, Arc<StorageService>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		(IdempotencyStore::new(Arc::clone(&storage)), storage)
	}

	#[tokio::test]
	async fn test_fresh_then_duplicate() {
		let store = store();

		let first = store.check_and_reserve("k1").await.unwrap();
		assert!(first.fresh);
		assert!(first.existing_result.is_none());

		let second = store.check_and_reserve("k1").await.unwrap();
		assert!(!second.fresh);
	}

	#[tokio::test]
	async fn test_duplicate_sees_stored_result() {
		let store = store();

		assert!(store.check_and_reserve("k1").await.unwrap().fresh);
		store
			.store_result("k1", serde_json::json!({ "authorization_id": "auth-1" }))
			.await
			.unwrap();

		let dup = store.check_and_reserve("k1").await.unwrap();
		assert!(!dup.fresh);
		assert_eq!(
			dup.existing_result.unwrap()["authorization_id"],
			"auth-1"
		);
	}

	#[tokio::test]
	async fn test_result_for_lapsed_reservation_is_ignored() {
		let store = store();
		store
			.store_result("never-reserved", serde_json::json!(1))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_expired_reservation_is_reserved_fresh() {
		let (store, storage) = store_with_storage();
		let now = current_timestamp();

		// A reservation whose window already closed, with a result the
		// original request stored before lapsing
		let stale = IdempotencyRecord {
			key: "k1".to_string(),
			created_at: now - IDEMPOTENCY_TTL_SECS - 60,
			expires_at: now - 60,
			result: Some(serde_json::json!({ "authorization_id": "old" })),
		};
		storage
			.store(StorageKey::IdempotencyKeys.as_str(), "k1", &stale)
			.await
			.unwrap();

		let reservation = store.check_and_reserve("k1").await.unwrap();
		assert!(reservation.fresh);
		assert!(reservation.existing_result.is_none());

		// The stale record was replaced, not resurrected
		let current: IdempotencyRecord = storage
			.retrieve(StorageKey::IdempotencyKeys.as_str(), "k1")
			.await
			.unwrap();
		assert!(current.expires_at > now);
		assert!(current.result.is_none());
	}

	#[tokio::test]
	async fn test_distinct_keys_are_independent() {
		let store = store();
		assert!(store.check_and_reserve("k1").await.unwrap().fresh);
		assert!(store.check_and_reserve("k2").await.unwrap().fresh);
	}

	#[tokio::test]
	async fn test_clean_expired_on_empty_store() {
		let store = store();
		assert_eq!(store.clean_expired().await.unwrap(), 0);
	}
}
