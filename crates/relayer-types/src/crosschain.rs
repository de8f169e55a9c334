//! Cross-chain transfer types.
//!
//! A cross-chain transaction tracks a multi-leg transfer to completion.
//! "Stalled" is a derived condition computed from `updated_at`, never a
//! stored status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A multi-leg cross-chain transfer tracked to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainTransaction {
	/// Unique identifier for this transfer.
	pub id: String,
	/// Current transfer status.
	pub status: TransferStatus,
	/// Expected completion time in seconds, when known.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub estimated_time_seconds: Option<u64>,
	/// Machine-readable error code when the transfer failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_code: Option<String>,
	/// Human-readable error message when the transfer failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	/// Timestamp when this transfer was created.
	pub created_at: u64,
	/// Timestamp of the last observed progress on this transfer.
	pub updated_at: u64,
}

/// Status of a cross-chain transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
	/// Initiated, first leg not yet observed.
	Pending,
	/// At least one leg in flight.
	Processing,
	/// All legs confirmed.
	Completed,
	/// Transfer failed or timed out.
	Failed,
}

impl TransferStatus {
	/// Returns true while the transfer can still make progress.
	pub fn is_active(&self) -> bool {
		matches!(self, TransferStatus::Pending | TransferStatus::Processing)
	}
}

impl fmt::Display for TransferStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferStatus::Pending => write!(f, "Pending"),
			TransferStatus::Processing => write!(f, "Processing"),
			TransferStatus::Completed => write!(f, "Completed"),
			TransferStatus::Failed => write!(f, "Failed"),
		}
	}
}
