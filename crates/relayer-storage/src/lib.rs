//! Storage module for the payment relayer system.
//!
//! This module provides abstractions for persistent storage of relayer
//! data. All cross-request coordination in the relayer happens through the
//! atomicity primitives exposed here (insert-if-absent, compare-and-swap,
//! atomic counters), never through in-process shared mutable state, so the
//! core stays correct under concurrent API callers and overlapping cron
//! sweeps.

use async_trait::async_trait;
use relayer_types::ConfigSchema;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Upper bound on compare-and-swap retries in [`StorageService::mutate`].
const MAX_CAS_ATTEMPTS: usize = 8;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when inserting under an existing live key.
	/// This is the uniqueness-constraint signal backing replay protection.
	#[error("Already exists")]
	AlreadyExists,
	/// Error that occurs when a guarded update lost every retry.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// integrate with the relayer. Beyond plain key-value operations with
/// optional TTL, backends must provide three atomic primitives:
/// insert-if-absent, compare-and-swap, and create-or-increment counters.
/// Expired entries behave as absent for every operation.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live, overwriting any
	/// previous value.
	///
	/// `None` and `Some(Duration::ZERO)` both mean the entry never
	/// expires; a zero TTL is "no TTL", not "already expired".
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Inserts raw bytes only if no live value exists for the key.
	///
	/// Fails with [`StorageError::AlreadyExists`] when a live value is
	/// present. This must be atomic with respect to concurrent inserts:
	/// exactly one of N concurrent callers succeeds.
	async fn insert_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Replaces the value only if the current bytes equal `expected`.
	///
	/// Returns true when the swap happened, false when the current value
	/// differed (including when the key is absent).
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Atomically creates-or-increments the counter at `key` and returns
	/// the new value. The first increment returns 1.
	async fn increment(&self, key: &str) -> Result<u64, StorageError>;

	/// Reads the counter at `key` without side effects; 0 when absent.
	async fn get_counter(&self, key: &str) -> Result<u64, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a live value exists for the key.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists all keys starting with the given prefix.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage (optional operation).
	/// Returns the number of entries removed.
	/// Implementations that don't support expiration can return Ok(0).
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0) // Default implementation for backends without TTL support
	}
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must
/// provide to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization. Namespaces map to the
/// collections in [`relayer_types::StorageKey`].
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = Self::serialize(data)?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Inserts a value only if the key is absent.
	///
	/// Fails with [`StorageError::AlreadyExists`] on a live duplicate;
	/// two concurrent inserts for the same key yield exactly one success.
	pub async fn insert<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = Self::serialize(data)?;
		self.backend
			.insert_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		Self::deserialize(&bytes)
	}

	/// Retrieves every value stored under a namespace.
	///
	/// Entries that disappear between the key scan and the read (expiry,
	/// concurrent delete) are skipped rather than treated as errors.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let keys = self.backend.list_keys(&prefix).await?;
		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => values.push(Self::deserialize(&bytes)?),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Applies a fallible closure to a stored value under a
	/// compare-and-swap guard and persists the result.
	///
	/// The closure observes the current value and either mutates it or
	/// rejects the update by returning an error (e.g. an illegal state
	/// transition). Lost races are retried with a freshly read value, so
	/// the closure's guard is always evaluated against current state;
	/// this is what makes overlapping sweeps idempotent.
	pub async fn mutate<T, E, F>(&self, namespace: &str, id: &str, mut apply: F) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		F: FnMut(&mut T) -> Result<(), E>,
	{
		let key = Self::key(namespace, id);

		for _ in 0..MAX_CAS_ATTEMPTS {
			let current = self.backend.get_bytes(&key).await?;
			let mut value: T = Self::deserialize(&current)?;
			apply(&mut value)?;
			let updated = Self::serialize(&value)?;
			if self
				.backend
				.compare_and_swap(&key, &current, updated)
				.await?
			{
				return Ok(value);
			}
		}

		Err(StorageError::Conflict(format!("update contention on {}", key)).into())
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Atomically creates-or-increments a counter and returns the new
	/// value.
	pub async fn increment(&self, namespace: &str, id: &str) -> Result<u64, StorageError> {
		self.backend.increment(&Self::key(namespace, id)).await
	}

	/// Reads a counter without side effects; 0 when absent.
	pub async fn counter(&self, namespace: &str, id: &str) -> Result<u64, StorageError> {
		self.backend.get_counter(&Self::key(namespace, id)).await
	}

	/// Removes expired entries from storage.
	///
	/// Returns the number of entries that were removed.
	/// This is a no-op for backends that don't support TTL.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;
	use std::sync::Arc;

	#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
	struct Record {
		id: String,
		value: u64,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_insert_is_unique() {
		let storage = service();
		let rec = Record {
			id: "a".into(),
			value: 1,
		};

		storage.insert("records", "a", &rec, None).await.unwrap();
		let err = storage.insert("records", "a", &rec, None).await.unwrap_err();
		assert!(matches!(err, StorageError::AlreadyExists));
	}

	#[tokio::test]
	async fn test_mutate_applies_and_persists() {
		let storage = service();
		let rec = Record {
			id: "a".into(),
			value: 1,
		};
		storage.store("records", "a", &rec).await.unwrap();

		let updated: Record = storage
			.mutate("records", "a", |r: &mut Record| {
				r.value += 1;
				Ok::<(), StorageError>(())
			})
			.await
			.unwrap();
		assert_eq!(updated.value, 2);

		let read: Record = storage.retrieve("records", "a").await.unwrap();
		assert_eq!(read, updated);
	}

	#[tokio::test]
	async fn test_mutate_guard_rejects_without_write() {
		let storage = service();
		let rec = Record {
			id: "a".into(),
			value: 1,
		};
		storage.store("records", "a", &rec).await.unwrap();

		let err = storage
			.mutate("records", "a", |_r: &mut Record| {
				Err(StorageError::Conflict("guard".into()))
			})
			.await
			.unwrap_err();
		assert!(matches!(err, StorageError::Conflict(_)));

		let read: Record = storage.retrieve("records", "a").await.unwrap();
		assert_eq!(read.value, 1);
	}

	#[tokio::test]
	async fn test_concurrent_increments_are_distinct_and_contiguous() {
		let storage = Arc::new(service());
		let mut handles = Vec::new();
		for _ in 0..32 {
			let storage = Arc::clone(&storage);
			handles.push(tokio::spawn(async move {
				storage.increment("counters", "k").await.unwrap()
			}));
		}

		let mut values = Vec::new();
		for handle in handles {
			values.push(handle.await.unwrap());
		}
		values.sort_unstable();
		assert_eq!(values, (1..=32).collect::<Vec<u64>>());
		assert_eq!(storage.counter("counters", "k").await.unwrap(), 32);
	}

	#[tokio::test]
	async fn test_retrieve_all_scopes_to_namespace() {
		let storage = service();
		for i in 0..3u64 {
			let rec = Record {
				id: format!("r{}", i),
				value: i,
			};
			storage.store("records", &rec.id.clone(), &rec).await.unwrap();
		}
		storage
			.store(
				"other",
				"x",
				&Record {
					id: "x".into(),
					value: 99,
				},
			)
			.await
			.unwrap();

		let records: Vec<Record> = storage.retrieve_all("records").await.unwrap();
		assert_eq!(records.len(), 3);
	}
}
