//! Core engine for the payment relayer system.
//!
//! This crate hosts the business logic of the relayer: the authorization
//! state machine, the nonce ledger, fee computation, idempotency keys,
//! cross-chain transfer transitions, and batch retry coordination. The
//! [`RelayerEngine`] wires the services together over a shared storage
//! backend and drives the periodic maintenance sweeps.

use relayer_config::Config;
use relayer_storage::StorageService;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub mod audit;
pub mod authorization;
pub mod batch;
pub mod crosschain;
pub mod fees;
pub mod idempotency;
pub mod nonce;

pub use audit::{AuditError, AuditLog};
pub use authorization::{AuthorizationError, AuthorizationRequest, AuthorizationStateMachine};
pub use batch::{BatchError, BatchRetryCoordinator, RetryOutcome, RetryPolicy, RetrySweepSummary};
pub use crosschain::{CrossChainTransitionEngine, StallSweepSummary, TransitionError};
pub use fees::{calculate_fee, validate_amount, FeeError, DEFAULT_FEE_BPS};
pub use idempotency::{IdempotencyError, IdempotencyStore};
pub use nonce::{NonceError, NonceLedger};

/// Errors that can occur during relayer operations.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Error related to configuration issues.
	#[error("Configuration error: {0}")]
	Config(String),
	/// Error from one of the relayer services.
	#[error("Service error: {0}")]
	Service(String),
}

/// Main relayer engine that coordinates the payment services.
///
/// The RelayerEngine owns one instance of each service, all backed by the
/// same storage, and runs the periodic maintenance loops:
/// - expired-entry cleanup (idempotency keys and other TTL'd records)
/// - budgeted batch retry sweeps
/// - stalled cross-chain transfer sweeps
pub struct RelayerEngine {
	/// Relayer configuration.
	config: Config,
	/// Storage service shared by every component.
	storage: Arc<StorageService>,
	/// Nonce ledger for replay protection.
	nonces: Arc<NonceLedger>,
	/// Authorization lifecycle state machine.
	authorizations: Arc<AuthorizationStateMachine>,
	/// Cross-chain transfer transitions and stall detection.
	transfers: Arc<CrossChainTransitionEngine>,
	/// Batch payment retry coordination.
	batches: Arc<BatchRetryCoordinator>,
	/// Request deduplication store.
	idempotency: Arc<IdempotencyStore>,
	/// Append-only audit trail.
	audit: Arc<AuditLog>,
}

impl RelayerEngine {
	/// Builds an engine with all services wired over the given storage.
	pub fn new(config: Config, storage: Arc<StorageService>) -> Self {
		let audit = Arc::new(AuditLog::new(Arc::clone(&storage)));
		let nonces = Arc::new(NonceLedger::new(Arc::clone(&storage)));
		let authorizations = Arc::new(AuthorizationStateMachine::new(
			Arc::clone(&storage),
			Arc::clone(&nonces),
			Arc::clone(&audit),
			config.fees.clone(),
		));
		let transfers = Arc::new(CrossChainTransitionEngine::new(
			Arc::clone(&storage),
			Arc::clone(&audit),
			config.sweeps.default_estimate_seconds,
		));
		let batches = Arc::new(BatchRetryCoordinator::new(
			Arc::clone(&storage),
			Arc::clone(&audit),
		));
		let idempotency = Arc::new(IdempotencyStore::new(Arc::clone(&storage)));

		Self {
			config,
			storage,
			nonces,
			authorizations,
			transfers,
			batches,
			idempotency,
			audit,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn nonces(&self) -> &Arc<NonceLedger> {
		&self.nonces
	}

	pub fn authorizations(&self) -> &Arc<AuthorizationStateMachine> {
		&self.authorizations
	}

	pub fn transfers(&self) -> &Arc<CrossChainTransitionEngine> {
		&self.transfers
	}

	pub fn batches(&self) -> &Arc<BatchRetryCoordinator> {
		&self.batches
	}

	pub fn idempotency(&self) -> &Arc<IdempotencyStore> {
		&self.idempotency
	}

	pub fn audit(&self) -> &Arc<AuditLog> {
		&self.audit
	}

	/// Main execution loop for the relayer engine.
	///
	/// Drives the three maintenance sweeps on their configured cadences
	/// until Ctrl+C. Sweep failures are logged and the loop keeps going;
	/// every sweep is idempotent, so a missed or failed pass is made up
	/// by the next one.
	pub async fn run(&self) -> Result<(), EngineError> {
		let sweeps = &self.config.sweeps;

		let mut cleanup_timer = interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let mut batch_timer = interval(Duration::from_secs(sweeps.batch_retry_interval_seconds));
		let mut stall_timer = interval(Duration::from_secs(sweeps.stall_check_interval_seconds));
		for timer in [&mut cleanup_timer, &mut batch_timer, &mut stall_timer] {
			timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// interval() fires immediately; skip the initial tick so
			// startup does not run every sweep at once
			timer.reset();
		}

		tracing::info!(
			relayer_id = %self.config.relayer.id,
			cleanup_interval = self.config.storage.cleanup_interval_seconds,
			batch_retry_interval = sweeps.batch_retry_interval_seconds,
			stall_check_interval = sweeps.stall_check_interval_seconds,
			"Relayer engine started"
		);

		loop {
			tokio::select! {
				_ = cleanup_timer.tick() => {
					match self.idempotency.clean_expired().await {
						Ok(removed) if removed > 0 => {
							tracing::info!(removed, "Cleaned expired storage entries");
						}
						Ok(_) => {}
						Err(e) => {
							tracing::warn!(error = %e, "Storage cleanup failed");
						}
					}
				}

				_ = batch_timer.tick() => {
					let summary = self
						.batches
						.retry_all_active_batches(sweeps.max_retries)
						.await;
					if summary.items_reset > 0 || !summary.errors.is_empty() {
						tracing::info!(
							batches_checked = summary.batches_checked,
							batches_with_retries = summary.batches_with_retries,
							items_reset = summary.items_reset,
							errors = summary.errors.len(),
							"Batch retry sweep finished"
						);
					}
					for error in &summary.errors {
						tracing::warn!(%error, "Batch retry sweep error");
					}
				}

				_ = stall_timer.tick() => {
					let summary = self
						.transfers
						.sweep_stalled(sweeps.stall_threshold_minutes)
						.await;
					if summary.checked > 0 || !summary.errors.is_empty() {
						tracing::info!(
							checked = summary.checked,
							timed_out = summary.timed_out,
							still_waiting = summary.still_waiting,
							errors = summary.errors.len(),
							"Stalled transfer sweep finished"
						);
					}
					for error in &summary.errors {
						tracing::warn!(%error, "Stalled transfer sweep error");
					}
				}

				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutting down relayer engine");
					break;
				}
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relayer_storage::implementations::memory::MemoryStorage;
	use relayer_types::RelayOutcome;

	fn engine() -> RelayerEngine {
		let config = Config::from_toml_str(
			r#"
			[relayer]
			id = "relayer-test"

			[storage]
			primary = "memory"
			[storage.implementations.memory]
			"#,
		)
		.unwrap();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		RelayerEngine::new(config, storage)
	}

	#[tokio::test]
	async fn test_services_share_storage() {
		let engine = engine();

		let key = relayer_types::NonceKey::new("owner-1", "0xToken", 1);
		let nonce = engine.nonces().increment_nonce(&key).await.unwrap();

		let auth = engine
			.authorizations()
			.create(AuthorizationRequest {
				owner_id: "owner-1".to_string(),
				token_address: "0xToken".to_string(),
				chain_id: 1,
				nonce,
				amount: "1000000".to_string(),
				valid_after: 0,
				valid_before: u64::MAX,
			})
			.await
			.unwrap();

		// The engine-level audit log sees what the state machine wrote
		let entries = engine.audit().entries_for(&auth.id).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].action, "created");
	}

	#[tokio::test]
	async fn test_executed_authorization_consumes_nonce() {
		let engine = engine();

		let key = relayer_types::NonceKey::new("owner-1", "0xToken", 1);
		let nonce = engine.nonces().increment_nonce(&key).await.unwrap();

		let auth = engine
			.authorizations()
			.create(AuthorizationRequest {
				owner_id: "owner-1".to_string(),
				token_address: "0xToken".to_string(),
				chain_id: 1,
				nonce,
				amount: "1000000".to_string(),
				valid_after: 0,
				valid_before: u64::MAX,
			})
			.await
			.unwrap();

		engine
			.authorizations()
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".to_string(),
				},
			)
			.await
			.unwrap();

		assert!(engine.nonces().is_nonce_used(&key, nonce).await.unwrap());
	}
}
