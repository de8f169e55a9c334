//! In-memory storage backend implementation for the relayer service.
//!
//! This module provides a memory-based implementation of the
//! StorageInterface trait, useful for testing and development scenarios
//! where persistence is not required. All atomic primitives are served
//! under a single write lock, so their one-winner guarantees hold for
//! concurrent callers within the process.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use relayer_types::{current_timestamp, ConfigSchema, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One stored value with its optional expiry timestamp.
#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	/// Unix seconds; None means the entry never expires.
	expires_at: Option<u64>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		// Zero TTL means "no TTL", matching the file backend's header
		// convention
		Self {
			value,
			expires_at: ttl
				.filter(|t| !t.is_zero())
				.map(|t| current_timestamp().saturating_add(t.as_secs())),
		}
	}

	fn is_expired(&self, now: u64) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// In-memory storage implementation.
///
/// Stores data in a HashMap behind a read-write lock, honoring TTLs so
/// expired entries read as absent. Counters live in a separate map and
/// are incremented under the write lock.
pub struct MemoryStorage {
	store: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
	entries: HashMap<String, Entry>,
	counters: HashMap<String, u64>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(Inner::default())),
		}
	}

	/// Reads a live entry, treating expired values as absent.
	fn live<'a>(inner: &'a Inner, key: &str, now: u64) -> Option<&'a Entry> {
		inner
			.entries
			.get(key)
			.filter(|entry| !entry.is_expired(now))
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		Self::live(&store, key, current_timestamp())
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.entries.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn insert_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		// Expired entries lose their slot; only live ones block the insert.
		if Self::live(&store, key, current_timestamp()).is_some() {
			return Err(StorageError::AlreadyExists);
		}
		store.entries.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		let now = current_timestamp();
		match Self::live(&store, key, now) {
			Some(entry) if entry.value == expected => {
				let expires_at = entry.expires_at;
				store.entries.insert(
					key.to_string(),
					Entry { value, expires_at },
				);
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn increment(&self, key: &str) -> Result<u64, StorageError> {
		let mut store = self.store.write().await;
		let counter = store.counters.entry(key.to_string()).or_insert(0);
		*counter += 1;
		Ok(*counter)
	}

	async fn get_counter(&self, key: &str) -> Result<u64, StorageError> {
		let store = self.store.read().await;
		Ok(store.counters.get(key).copied().unwrap_or(0))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(Self::live(&store, key, current_timestamp()).is_some())
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		let now = current_timestamp();
		Ok(store
			.entries
			.iter()
			.filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let now = current_timestamp();
		let before = store.entries.len();
		store.entries.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.entries.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}
