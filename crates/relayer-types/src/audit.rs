//! Audit trail types.
//!
//! Every state-machine transition appends one immutable audit entry so the
//! economic history of a record can be reconstructed after the fact.

use serde::{Deserialize, Serialize};

/// One append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
	/// Unique identifier for this entry.
	pub id: String,
	/// Kind of record the entry refers to.
	pub entity_type: AuditEntityType,
	/// Identifier of the record the entry refers to.
	pub entity_id: String,
	/// Action performed, e.g. "created", "cancelled", "executed".
	pub action: String,
	/// Action-specific details (relayer address, fee, error, counts).
	pub details: serde_json::Value,
	/// Position in the global append order. Timestamps have second
	/// granularity, so this is what makes the order total.
	pub sequence: u64,
	/// Timestamp when the action happened.
	pub timestamp: u64,
}

/// Kinds of records that produce audit entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuditEntityType {
	Authorization,
	CrossChainTransaction,
	BatchPayment,
}

impl AuditEntityType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditEntityType::Authorization => "authorization",
			AuditEntityType::CrossChainTransaction => "crossChainTransaction",
			AuditEntityType::BatchPayment => "batchPayment",
		}
	}
}
