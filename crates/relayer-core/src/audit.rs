//! Append-only audit log.
//!
//! Every state-machine transition and sweep action records one immutable
//! entry here. Entries are write-once; nothing in the system updates or
//! deletes them.

use relayer_storage::StorageService;
use relayer_types::{current_timestamp, AuditEntityType, AuditEntry, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while writing or reading audit entries.
#[derive(Debug, Error)]
pub enum AuditError {
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Append-only journal of state-machine actions.
pub struct AuditLog {
	storage: Arc<StorageService>,
}

impl AuditLog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Appends one audit entry and returns it.
	pub async fn record(
		&self,
		entity_type: AuditEntityType,
		entity_id: &str,
		action: &str,
		details: serde_json::Value,
	) -> Result<AuditEntry, AuditError> {
		// Atomic counter, so concurrent writers get a total append order
		// even within the same second
		let sequence = self
			.storage
			.increment(StorageKey::AuditLog.as_str(), "sequence")
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?;

		let entry = AuditEntry {
			id: Uuid::new_v4().to_string(),
			entity_type,
			entity_id: entity_id.to_string(),
			action: action.to_string(),
			details,
			sequence,
			timestamp: current_timestamp(),
		};

		self.storage
			.store(StorageKey::AuditLog.as_str(), &entry.id, &entry)
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?;

		Ok(entry)
	}

	/// Returns all entries for one entity, oldest first.
	pub async fn entries_for(&self, entity_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
		let mut entries: Vec<AuditEntry> = self
			.storage
			.retrieve_all::<AuditEntry>(StorageKey::AuditLog.as_str())
			.await
			.map_err(|e| AuditError::Storage(e.to_string()))?
			.into_iter()
			.filter(|entry| entry.entity_id == entity_id)
			.collect();
		entries.sort_by_key(|entry| entry.sequence);
		Ok(entries)
	}
}
