//! Batch payment retry coordination.
//!
//! Failed items are reset to Pending one CAS at a time, so a retry sweep
//! that dies halfway leaves every touched item in a consistent state and
//! the next sweep simply picks up the remainder. The batch record is a
//! rollup updated after the items; it can lag briefly but always
//! reconverges.

use crate::audit::AuditLog;
use relayer_storage::{StorageError, StorageService};
use relayer_types::{
	current_timestamp, truncate_id, AuditEntityType, BatchPayment, BatchStatus, PaymentItem,
	StorageKey,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during batch retry coordination.
#[derive(Debug, Error)]
pub enum BatchError {
	#[error("Batch not found")]
	NotFound,
	#[error("Caller does not own this batch")]
	Unauthorized,
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for BatchError {
	fn from(e: StorageError) -> Self {
		match e {
			StorageError::NotFound => BatchError::NotFound,
			other => BatchError::Storage(other.to_string()),
		}
	}
}

/// How a retry pass selects failed items.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
	/// Operator-initiated: every failed item is reset regardless of how
	/// often it already failed.
	Manual,
	/// Automatic sweep: an item is reset only while its retry count is
	/// below the budget, and each reset consumes one attempt.
	Budgeted { max_retries: u32 },
}

/// Result of retrying one batch.
#[derive(Debug)]
pub struct RetryOutcome {
	/// Failed items reset to Pending.
	pub reset_count: usize,
}

/// Summary of one pass over all active batches.
#[derive(Debug, Default)]
pub struct RetrySweepSummary {
	pub batches_checked: usize,
	pub batches_with_retries: usize,
	pub items_reset: usize,
	/// Per-batch errors; the sweep continues past them.
	pub errors: Vec<String>,
}

/// Resets failed payment items so the normal pipeline can pick them up
/// again.
pub struct BatchRetryCoordinator {
	storage: Arc<StorageService>,
	audit: Arc<AuditLog>,
}

impl BatchRetryCoordinator {
	pub fn new(storage: Arc<StorageService>, audit: Arc<AuditLog>) -> Self {
		Self { storage, audit }
	}

	/// Resets the failed items of one batch to Pending.
	///
	/// With an `owner`, the batch must belong to them. A batch with no
	/// retryable items is a no-op returning `reset_count = 0`, never an
	/// error.
	pub async fn retry_failed_items(
		&self,
		batch_id: &str,
		owner: Option<&str>,
		policy: RetryPolicy,
	) -> Result<RetryOutcome, BatchError> {
		let batch: BatchPayment = self
			.storage
			.retrieve(StorageKey::Batches.as_str(), batch_id)
			.await?;
		if let Some(owner) = owner {
			if batch.owner_id != owner {
				return Err(BatchError::Unauthorized);
			}
		}

		let items: Vec<PaymentItem> = self
			.storage
			.retrieve_all(StorageKey::PaymentItems.as_str())
			.await?;

		let mut reset_count = 0usize;
		for item in items
			.into_iter()
			.filter(|i| i.batch_id == batch_id && i.status == BatchStatus::Failed)
		{
			match self.reset_item(&item.id, policy).await {
				Ok(true) => reset_count += 1,
				Ok(false) => {}
				// Deleted or already picked up between scan and reset.
				Err(BatchError::NotFound) => {}
				Err(e) => return Err(e),
			}
		}

		if reset_count > 0 {
			self.storage
				.mutate(
					StorageKey::Batches.as_str(),
					batch_id,
					|batch: &mut BatchPayment| -> Result<(), StorageError> {
						batch.failed_items = batch.failed_items.saturating_sub(reset_count as u32);
						batch.status = BatchStatus::Processing;
						batch.updated_at = current_timestamp();
						Ok(())
					},
				)
				.await?;

			self.audit
				.record(
					AuditEntityType::BatchPayment,
					batch_id,
					"items_retried",
					serde_json::json!({ "reset_count": reset_count }),
				)
				.await
				.map_err(|e| BatchError::Storage(e.to_string()))?;

			tracing::info!(
				batch_id = %truncate_id(batch_id),
				reset_count,
				"Reset failed batch items for retry"
			);
		}

		Ok(RetryOutcome { reset_count })
	}

	/// Resets one failed item to Pending under the policy.
	///
	/// Returns false when the item is no longer failed or its retry
	/// budget is spent.
	async fn reset_item(&self, item_id: &str, policy: RetryPolicy) -> Result<bool, BatchError> {
		let outcome: Result<PaymentItem, ItemSkip> = self
			.storage
			.mutate(
				StorageKey::PaymentItems.as_str(),
				item_id,
				|item: &mut PaymentItem| {
					if item.status != BatchStatus::Failed {
						return Err(ItemSkip::NotRetryable);
					}
					if let RetryPolicy::Budgeted { max_retries } = policy {
						if item.retry_count >= max_retries {
							return Err(ItemSkip::BudgetSpent);
						}
						item.retry_count += 1;
					}
					item.status = BatchStatus::Pending;
					item.error_reason = None;
					item.updated_at = current_timestamp();
					Ok(())
				},
			)
			.await;

		match outcome {
			Ok(_) => Ok(true),
			Err(ItemSkip::NotRetryable) | Err(ItemSkip::BudgetSpent) => Ok(false),
			Err(ItemSkip::Storage(e)) => Err(e.into()),
		}
	}

	/// Runs a budgeted retry pass over every active batch.
	///
	/// A batch that fails to process is recorded in `errors` and the
	/// sweep moves on; one bad batch never blocks the rest.
	pub async fn retry_all_active_batches(&self, max_retries: u32) -> RetrySweepSummary {
		let mut summary = RetrySweepSummary::default();

		let batches: Vec<BatchPayment> = match self
			.storage
			.retrieve_all(StorageKey::Batches.as_str())
			.await
		{
			Ok(batches) => batches,
			Err(e) => {
				summary.errors.push(format!("batch scan failed: {}", e));
				return summary;
			}
		};

		for batch in batches.into_iter().filter(|b| b.status.is_active()) {
			summary.batches_checked += 1;
			match self
				.retry_failed_items(&batch.id, None, RetryPolicy::Budgeted { max_retries })
				.await
			{
				Ok(outcome) if outcome.reset_count > 0 => {
					summary.batches_with_retries += 1;
					summary.items_reset += outcome.reset_count;
				}
				Ok(_) => {}
				Err(e) => {
					summary.errors.push(format!("batch {}: {}", batch.id, e));
				}
			}
		}

		summary
	}
}

/// Item-level skip reasons inside a retry pass.
enum ItemSkip {
	NotRetryable,
	BudgetSpent,
	Storage(StorageError),
}

impl From<StorageError> for ItemSkip {
	fn from(e: StorageError) -> Self {
		ItemSkip::Storage(e)
	}
}
