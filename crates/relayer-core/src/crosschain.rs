//! Cross-chain transfer transitions and stalled-transfer detection.
//!
//! Transfers only ever move from an active state (Pending/Processing) to a
//! terminal one (Completed/Failed); anything else is an invalid
//! transition. Stall handling is two-phase: a coarse staleness filter over
//! `updated_at`, then a per-record budget check of twice the transfer's
//! completion estimate, so legitimately slow chains are not failed early
//! while the sweep stays cheap. Timeouts are wall-clock comparisons, so
//! they survive process restarts.

use crate::audit::AuditLog;
use relayer_storage::{StorageError, StorageService};
use relayer_types::{
	current_timestamp, truncate_id, AuditEntityType, CrossChainTransaction, StorageKey,
	TransferStatus,
};
use std::sync::Arc;
use thiserror::Error;

/// Error code recorded on transfers failed by the stall sweep.
pub const TIMEOUT_ERROR_CODE: &str = "TIMEOUT";

/// Errors that can occur during transfer state management.
#[derive(Debug, Error)]
pub enum TransitionError {
	#[error("Cross-chain transaction not found")]
	NotFound,
	#[error("Invalid transition from {from} to {to}")]
	InvalidTransition {
		from: TransferStatus,
		to: TransferStatus,
	},
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for TransitionError {
	fn from(e: StorageError) -> Self {
		match e {
			StorageError::NotFound => TransitionError::NotFound,
			other => TransitionError::Storage(other.to_string()),
		}
	}
}

/// Summary of one stalled-transfer sweep.
#[derive(Debug, Default)]
pub struct StallSweepSummary {
	/// Stale transfers inspected.
	pub checked: usize,
	/// Transfers failed with a timeout.
	pub timed_out: usize,
	/// Stale transfers still within their completion budget.
	pub still_waiting: usize,
	/// Per-record errors; the sweep continues past them.
	pub errors: Vec<String>,
}

/// Applies terminal transitions to cross-chain transfers and runs the
/// stall sweep.
pub struct CrossChainTransitionEngine {
	storage: Arc<StorageService>,
	audit: Arc<AuditLog>,
	/// Completion estimate in seconds used when a transfer has none.
	default_estimate_seconds: u64,
}

impl CrossChainTransitionEngine {
	pub fn new(
		storage: Arc<StorageService>,
		audit: Arc<AuditLog>,
		default_estimate_seconds: u64,
	) -> Self {
		Self {
			storage,
			audit,
			default_estimate_seconds,
		}
	}

	/// Transitions a transfer to a terminal status.
	///
	/// Only Pending/Processing -> Completed/Failed is legal. The guard is
	/// re-evaluated under a CAS, so concurrent sweeps or callers settle a
	/// transfer exactly once.
	pub async fn transition(
		&self,
		id: &str,
		to: TransferStatus,
		reason_code: &str,
		details: serde_json::Value,
	) -> Result<CrossChainTransaction, TransitionError> {
		let reason = reason_code.to_string();
		let transfer = self
			.storage
			.mutate(
				StorageKey::CrossChainTransactions.as_str(),
				id,
				|tx: &mut CrossChainTransaction| {
					if !tx.status.is_active() || to.is_active() {
						return Err(TransitionError::InvalidTransition {
							from: tx.status,
							to,
						});
					}
					tx.status = to;
					tx.updated_at = current_timestamp();
					if to == TransferStatus::Failed {
						tx.error_code = Some(reason.clone());
						tx.error_message = details
							.get("message")
							.and_then(|m| m.as_str())
							.map(String::from);
					}
					Ok(())
				},
			)
			.await?;

		self.audit
			.record(
				AuditEntityType::CrossChainTransaction,
				id,
				"transitioned",
				serde_json::json!({
					"to": to,
					"reason_code": reason_code,
					"details": details,
				}),
			)
			.await
			.map_err(|e| TransitionError::Storage(e.to_string()))?;

		tracing::info!(
			transfer_id = %truncate_id(id),
			to = %to,
			reason_code = %reason_code,
			"Cross-chain transfer transitioned"
		);

		Ok(transfer)
	}

	/// Returns active transfers whose last progress is older than the
	/// threshold.
	pub async fn find_stalled(
		&self,
		threshold_minutes: u64,
	) -> Result<Vec<CrossChainTransaction>, TransitionError> {
		let now = current_timestamp();
		let cutoff = threshold_minutes * 60;
		let transfers: Vec<CrossChainTransaction> = self
			.storage
			.retrieve_all(StorageKey::CrossChainTransactions.as_str())
			.await?;

		Ok(transfers
			.into_iter()
			.filter(|tx| tx.status.is_active() && now.saturating_sub(tx.updated_at) > cutoff)
			.collect())
	}

	/// Fails stale transfers that exceeded twice their completion
	/// estimate; leaves the rest untouched.
	///
	/// Re-running a partially completed sweep is safe: each timeout is a
	/// guarded transition that re-checks current state, so a transfer is
	/// never failed twice.
	pub async fn sweep_stalled(&self, threshold_minutes: u64) -> StallSweepSummary {
		let mut summary = StallSweepSummary::default();

		let stalled = match self.find_stalled(threshold_minutes).await {
			Ok(stalled) => stalled,
			Err(e) => {
				summary.errors.push(format!("stall scan failed: {}", e));
				return summary;
			}
		};

		let now = current_timestamp();
		for transfer in stalled {
			summary.checked += 1;

			let elapsed = now.saturating_sub(transfer.updated_at);
			let estimate = transfer
				.estimated_time_seconds
				.unwrap_or(self.default_estimate_seconds);
			let budget = estimate.saturating_mul(2);

			if elapsed <= budget {
				// Still within budget; a slow chain is not a dead one.
				tracing::debug!(
					transfer_id = %truncate_id(&transfer.id),
					elapsed_secs = elapsed,
					budget_secs = budget,
					"Stale transfer still waiting"
				);
				summary.still_waiting += 1;
				continue;
			}

			let message = format!(
				"Transaction stalled for {} minutes (estimated completion {} minutes)",
				elapsed / 60,
				estimate / 60
			);
			match self
				.transition(
					&transfer.id,
					TransferStatus::Failed,
					TIMEOUT_ERROR_CODE,
					serde_json::json!({
						"message": message,
						"elapsed_seconds": elapsed,
						"estimate_seconds": estimate,
					}),
				)
				.await
			{
				Ok(_) => summary.timed_out += 1,
				// Settled by a concurrent caller between scan and
				// transition; nothing to do.
				Err(TransitionError::InvalidTransition { .. }) => {
					summary.still_waiting += 1;
				}
				Err(e) => {
					summary
						.errors
						.push(format!("transfer {}: {}", transfer.id, e));
				}
			}
		}

		summary
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relayer_storage::implementations::memory::MemoryStorage;

	struct Fixture {
		engine: CrossChainTransitionEngine,
		storage: Arc<StorageService>,
	}

	fn fixture() -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let audit = Arc::new(AuditLog::new(Arc::clone(&storage)));
		let engine = CrossChainTransitionEngine::new(Arc::clone(&storage), audit, 600);
		Fixture { engine, storage }
	}

	async fn seed(
		fx: &Fixture,
		id: &str,
		status: TransferStatus,
		age_seconds: u64,
		estimate: Option<u64>,
	) {
		let now = current_timestamp();
		let transfer = CrossChainTransaction {
			id: id.to_string(),
			status,
			estimated_time_seconds: estimate,
			error_code: None,
			error_message: None,
			created_at: now.saturating_sub(age_seconds),
			updated_at: now.saturating_sub(age_seconds),
		};
		fx.storage
			.store(StorageKey::CrossChainTransactions.as_str(), id, &transfer)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_transition_to_completed() {
		let fx = fixture();
		seed(&fx, "tx-1", TransferStatus::Processing, 0, None).await;

		let transfer = fx
			.engine
			.transition(
				"tx-1",
				TransferStatus::Completed,
				"CONFIRMED",
				serde_json::json!({}),
			)
			.await
			.unwrap();
		assert_eq!(transfer.status, TransferStatus::Completed);
		assert!(transfer.error_code.is_none());
	}

	#[tokio::test]
	async fn test_transition_out_of_terminal_is_rejected() {
		let fx = fixture();
		seed(&fx, "tx-1", TransferStatus::Completed, 0, None).await;

		let err = fx
			.engine
			.transition(
				"tx-1",
				TransferStatus::Failed,
				"X",
				serde_json::json!({}),
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TransitionError::InvalidTransition {
				from: TransferStatus::Completed,
				to: TransferStatus::Failed,
			}
		));
	}

	#[tokio::test]
	async fn test_transition_to_active_is_rejected() {
		let fx = fixture();
		seed(&fx, "tx-1", TransferStatus::Pending, 0, None).await;

		let err = fx
			.engine
			.transition(
				"tx-1",
				TransferStatus::Processing,
				"X",
				serde_json::json!({}),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn test_find_stalled_filters_by_age_and_status() {
		let fx = fixture();
		seed(&fx, "old-pending", TransferStatus::Pending, 45 * 60, None).await;
		seed(&fx, "old-done", TransferStatus::Completed, 45 * 60, None).await;
		seed(&fx, "fresh", TransferStatus::Processing, 60, None).await;

		let stalled = fx.engine.find_stalled(30).await.unwrap();
		assert_eq!(stalled.len(), 1);
		assert_eq!(stalled[0].id, "old-pending");
	}

	#[tokio::test]
	async fn test_sweep_fails_transfer_past_budget() {
		let fx = fixture();
		// 45 minutes old, 10-minute estimate -> 20-minute budget exceeded
		seed(&fx, "tx-1", TransferStatus::Processing, 45 * 60, Some(600)).await;

		let summary = fx.engine.sweep_stalled(30).await;
		assert_eq!(summary.checked, 1);
		assert_eq!(summary.timed_out, 1);
		assert!(summary.errors.is_empty());

		let transfer: CrossChainTransaction = fx
			.storage
			.retrieve(StorageKey::CrossChainTransactions.as_str(), "tx-1")
			.await
			.unwrap();
		assert_eq!(transfer.status, TransferStatus::Failed);
		assert_eq!(transfer.error_code.as_deref(), Some(TIMEOUT_ERROR_CODE));
		let message = transfer.error_message.unwrap();
		assert!(message.contains("45 minutes"), "message: {message}");
		assert!(message.contains("10 minutes"), "message: {message}");
	}

	#[tokio::test]
	async fn test_sweep_leaves_transfer_within_budget() {
		let fx = fixture();
		// 45 minutes old but a 30-minute estimate buys a 60-minute budget
		seed(&fx, "tx-1", TransferStatus::Processing, 45 * 60, Some(1800)).await;

		let summary = fx.engine.sweep_stalled(30).await;
		assert_eq!(summary.checked, 1);
		assert_eq!(summary.timed_out, 0);
		assert_eq!(summary.still_waiting, 1);

		let transfer: CrossChainTransaction = fx
			.storage
			.retrieve(StorageKey::CrossChainTransactions.as_str(), "tx-1")
			.await
			.unwrap();
		assert_eq!(transfer.status, TransferStatus::Processing);
	}

	#[tokio::test]
	async fn test_sweep_uses_default_estimate_when_unset() {
		let fx = fixture();
		// Default estimate 600s -> 20-minute budget; 25 minutes elapsed
		seed(&fx, "tx-1", TransferStatus::Pending, 25 * 60, None).await;
		// 15 minutes elapsed stays within budget but past the 10-minute
		// staleness threshold
		seed(&fx, "tx-2", TransferStatus::Pending, 15 * 60, None).await;

		let summary = fx.engine.sweep_stalled(10).await;
		assert_eq!(summary.checked, 2);
		assert_eq!(summary.timed_out, 1);
		assert_eq!(summary.still_waiting, 1);
	}

	#[tokio::test]
	async fn test_sweep_tolerates_huge_estimate() {
		let fx = fixture();
		// Stored estimates are caller data; an absurd value must widen the
		// budget, not wrap it
		seed(
			&fx,
			"tx-1",
			TransferStatus::Processing,
			45 * 60,
			Some(u64::MAX),
		)
		.await;

		let summary = fx.engine.sweep_stalled(30).await;
		assert_eq!(summary.checked, 1);
		assert_eq!(summary.timed_out, 0);
		assert_eq!(summary.still_waiting, 1);
	}

	#[tokio::test]
	async fn test_sweep_is_idempotent() {
		let fx = fixture();
		seed(&fx, "tx-1", TransferStatus::Processing, 45 * 60, Some(600)).await;

		let first = fx.engine.sweep_stalled(30).await;
		assert_eq!(first.timed_out, 1);

		// Failed transfers are no longer candidates
		let second = fx.engine.sweep_stalled(30).await;
		assert_eq!(second.checked, 0);
		assert_eq!(second.timed_out, 0);
	}
}
