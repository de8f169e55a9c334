//! Batch payment types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A batch of payment items processed together.
///
/// Batch status is a rollup over its items; the items themselves are the
/// authoritative record of per-payment progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayment {
	/// Unique identifier for this batch.
	pub id: String,
	/// Identifier of the owner that submitted the batch.
	pub owner_id: String,
	/// Rolled-up batch status.
	pub status: BatchStatus,
	/// Total number of items in the batch.
	pub total_items: u32,
	/// Number of items that completed.
	pub completed_items: u32,
	/// Number of items currently failed.
	pub failed_items: u32,
	/// Timestamp when this batch was created.
	pub created_at: u64,
	/// Timestamp when this batch was last updated.
	pub updated_at: u64,
}

/// One payment inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentItem {
	/// Unique identifier for this item.
	pub id: String,
	/// Identifier of the batch this item belongs to.
	pub batch_id: String,
	/// Current item status.
	pub status: BatchStatus,
	/// Reason recorded when the item failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_reason: Option<String>,
	/// Number of retry attempts consumed so far.
	pub retry_count: u32,
	/// Timestamp when this item was created.
	pub created_at: u64,
	/// Timestamp when this item was last updated.
	pub updated_at: u64,
}

/// Status shared by batches and their items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
	/// Queued, not yet picked up.
	Pending,
	/// Being worked on.
	Processing,
	/// Finished successfully.
	Completed,
	/// Finished with an error.
	Failed,
}

impl BatchStatus {
	/// Returns true while more work can happen on the record.
	pub fn is_active(&self) -> bool {
		matches!(self, BatchStatus::Pending | BatchStatus::Processing)
	}
}

impl fmt::Display for BatchStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BatchStatus::Pending => write!(f, "Pending"),
			BatchStatus::Processing => write!(f, "Processing"),
			BatchStatus::Completed => write!(f, "Completed"),
			BatchStatus::Failed => write!(f, "Failed"),
		}
	}
}
