//! Authorization state machine implementation.
//!
//! Manages the lifecycle of a signed payment authorization from creation
//! to on-chain settlement or cancellation:
//! Pending -> {Processing, Cancelled}, Processing -> {Completed, Failed},
//! Pending -> Failed. Completed, Failed and Cancelled are terminal.
//!
//! All transitions are compare-and-swap guarded against the expected prior
//! state, and every transition appends an audit entry. The nonce of an
//! authorization is consumed (inserted into the unique used-set) when it
//! is executed or cancelled, so the same signed payload can never produce
//! two economic effects.

use crate::audit::AuditLog;
use crate::fees::{self, FeeError};
use crate::nonce::{NonceError, NonceLedger};
use once_cell::sync::Lazy;
use relayer_config::FeeConfig;
use relayer_storage::{StorageError, StorageService};
use relayer_types::{
	current_timestamp, truncate_id, AuditEntityType, Authorization, AuthorizationStatus,
	ExecutionReceipt, NonceKey, RelayOutcome, StorageKey,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during authorization state management.
#[derive(Debug, Error)]
pub enum AuthorizationError {
	/// The authorization does not exist, or the caller does not own it.
	/// Ownership mismatches on reads collapse into this variant so
	/// existence is never leaked cross-tenant.
	#[error("Authorization not found")]
	NotFound,
	/// The caller does not own the authorization.
	#[error("Unauthorized")]
	Unauthorized,
	/// The requested transition is not legal from the current state.
	#[error("Invalid state transition from {from} to {to}")]
	InvalidState {
		from: AuthorizationStatus,
		to: AuthorizationStatus,
	},
	/// The request itself is malformed (validity window, unallocated nonce).
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error(transparent)]
	Nonce(#[from] NonceError),
	#[error(transparent)]
	Fee(#[from] FeeError),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for AuthorizationError {
	fn from(e: StorageError) -> Self {
		match e {
			StorageError::NotFound => AuthorizationError::NotFound,
			other => AuthorizationError::Storage(other.to_string()),
		}
	}
}

/// Request to create a new authorization from an accepted signature.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
	/// Owner that signed the payment instruction.
	pub owner_id: String,
	/// Token being transferred.
	pub token_address: String,
	/// Chain the authorization settles on.
	pub chain_id: u64,
	/// Nonce embedded in the signed payload. Must have been allocated via
	/// [`NonceLedger::increment_nonce`] beforehand.
	pub nonce: u64,
	/// Transfer amount as a base-10 integer string.
	pub amount: String,
	/// Unix timestamp before which the payload is not valid.
	pub valid_after: u64,
	/// Unix timestamp after which the payload expires.
	pub valid_before: u64,
}

/// Manages authorization state transitions and persistence.
pub struct AuthorizationStateMachine {
	storage: Arc<StorageService>,
	nonces: Arc<NonceLedger>,
	audit: Arc<AuditLog>,
	fees: FeeConfig,
}

impl AuthorizationStateMachine {
	pub fn new(
		storage: Arc<StorageService>,
		nonces: Arc<NonceLedger>,
		audit: Arc<AuditLog>,
		fees: FeeConfig,
	) -> Self {
		Self {
			storage,
			nonces,
			audit,
			fees,
		}
	}

	/// Checks if a state transition is valid.
	fn is_valid_transition(from: AuthorizationStatus, to: AuthorizationStatus) -> bool {
		// Static transition table - each state maps to allowed next states
		static TRANSITIONS: Lazy<HashMap<AuthorizationStatus, HashSet<AuthorizationStatus>>> =
			Lazy::new(|| {
				let mut m = HashMap::new();
				m.insert(
					AuthorizationStatus::Pending,
					HashSet::from([
						AuthorizationStatus::Processing,
						AuthorizationStatus::Cancelled,
						AuthorizationStatus::Failed,
					]),
				);
				m.insert(
					AuthorizationStatus::Processing,
					HashSet::from([
						AuthorizationStatus::Completed,
						AuthorizationStatus::Failed,
					]),
				);
				m.insert(AuthorizationStatus::Completed, HashSet::new()); // terminal
				m.insert(AuthorizationStatus::Failed, HashSet::new()); // terminal
				m.insert(AuthorizationStatus::Cancelled, HashSet::new()); // terminal
				m
			});

		TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Transitions an authorization under a CAS guard, applying `fill` to
	/// the record once the transition has been validated.
	async fn transition_with<F>(
		&self,
		id: &str,
		to: AuthorizationStatus,
		fill: F,
	) -> Result<Authorization, AuthorizationError>
	where
		F: Fn(&mut Authorization),
	{
		self.storage
			.mutate(
				StorageKey::Authorizations.as_str(),
				id,
				|auth: &mut Authorization| {
					if !Self::is_valid_transition(auth.status, to) {
						return Err(AuthorizationError::InvalidState {
							from: auth.status,
							to,
						});
					}
					auth.status = to;
					auth.updated_at = current_timestamp();
					fill(auth);
					Ok(())
				},
			)
			.await
	}

	/// Creates a new pending authorization from an accepted signature.
	///
	/// The caller must have allocated the embedded nonce through the
	/// nonce ledger; creation itself does not consume it.
	pub async fn create(
		&self,
		request: AuthorizationRequest,
	) -> Result<Authorization, AuthorizationError> {
		fees::validate_amount(&request.amount)?;

		if request.valid_before <= request.valid_after {
			return Err(AuthorizationError::InvalidRequest(format!(
				"validity window is empty: valid_after={} valid_before={}",
				request.valid_after, request.valid_before
			)));
		}

		let key = NonceKey::new(&request.owner_id, &request.token_address, request.chain_id);
		if request.nonce == 0 || request.nonce > self.nonces.current_nonce(&key).await? {
			return Err(AuthorizationError::InvalidRequest(format!(
				"nonce {} was not allocated for {}",
				request.nonce, key
			)));
		}
		// Fail fast on an obvious replay; the authoritative rejection
		// still happens at consumption time under the unique constraint.
		if self.nonces.is_nonce_used(&key, request.nonce).await? {
			return Err(NonceError::DuplicateNonce {
				key: key.counter_id(),
				nonce: request.nonce,
			}
			.into());
		}

		let now = current_timestamp();
		let authorization = Authorization {
			id: Uuid::new_v4().to_string(),
			owner_id: request.owner_id,
			token_address: request.token_address,
			chain_id: request.chain_id,
			nonce: request.nonce,
			amount: request.amount,
			status: AuthorizationStatus::Pending,
			relayer_address: None,
			relayer_fee: None,
			transaction_hash: None,
			error_code: None,
			error_message: None,
			valid_after: request.valid_after,
			valid_before: request.valid_before,
			created_at: now,
			updated_at: now,
		};

		self.storage
			.insert(
				StorageKey::Authorizations.as_str(),
				&authorization.id,
				&authorization,
				None,
			)
			.await?;

		self.audit
			.record(
				AuditEntityType::Authorization,
				&authorization.id,
				"created",
				serde_json::json!({
					"owner_id": authorization.owner_id,
					"token_address": authorization.token_address,
					"chain_id": authorization.chain_id,
					"nonce": authorization.nonce,
					"amount": authorization.amount,
				}),
			)
			.await
			.map_err(|e| AuthorizationError::Storage(e.to_string()))?;

		tracing::info!(
			authorization_id = %truncate_id(&authorization.id),
			nonce = authorization.nonce,
			"Created authorization"
		);

		Ok(authorization)
	}

	/// Cancels a pending authorization.
	///
	/// Cancellation still consumes the nonce slot so the signed payload
	/// can never be relayed later.
	pub async fn cancel(&self, id: &str, owner_id: &str) -> Result<Authorization, AuthorizationError> {
		// Ownership is checked before the state guard so a wrong owner
		// gets Unauthorized even on a terminal record.
		let current: Authorization = self
			.storage
			.retrieve(StorageKey::Authorizations.as_str(), id)
			.await?;
		if current.owner_id != owner_id {
			return Err(AuthorizationError::Unauthorized);
		}

		let authorization = self
			.transition_with(id, AuthorizationStatus::Cancelled, |_| {})
			.await?;

		let key = NonceKey::new(
			&authorization.owner_id,
			&authorization.token_address,
			authorization.chain_id,
		);
		self.nonces.mark_nonce_used(&key, authorization.nonce).await?;

		self.audit
			.record(
				AuditEntityType::Authorization,
				id,
				"cancelled",
				serde_json::json!({ "nonce": authorization.nonce }),
			)
			.await
			.map_err(|e| AuthorizationError::Storage(e.to_string()))?;

		tracing::info!(
			authorization_id = %truncate_id(id),
			"Cancelled authorization"
		);

		Ok(authorization)
	}

	/// Executes a pending authorization with the supplied relay outcome.
	///
	/// The authorization moves to Processing (only one concurrent caller
	/// can win that transition), its nonce is consumed under the unique
	/// constraint, and the caller-supplied outcome then settles it as
	/// Completed or Failed. The engine never polls the chain itself.
	pub async fn execute(
		&self,
		id: &str,
		relayer_address: &str,
		outcome: RelayOutcome,
	) -> Result<ExecutionReceipt, AuthorizationError> {
		let pending: Authorization = self
			.storage
			.retrieve(StorageKey::Authorizations.as_str(), id)
			.await?;

		let fee = fees::calculate_fee(
			&pending.amount,
			Some(self.fees.default_bps),
			self.fees.fee_cap.as_deref(),
		)?;

		let relayer = relayer_address.to_string();
		let fee_for_fill = fee.clone();
		let processing = self
			.transition_with(id, AuthorizationStatus::Processing, move |auth| {
				auth.relayer_address = Some(relayer.clone());
				auth.relayer_fee = Some(fee_for_fill.clone());
			})
			.await?;

		self.audit
			.record(
				AuditEntityType::Authorization,
				id,
				"processing",
				serde_json::json!({
					"relayer_address": relayer_address,
					"relayer_fee": fee,
				}),
			)
			.await
			.map_err(|e| AuthorizationError::Storage(e.to_string()))?;

		// Consume the nonce now that we own the Processing transition.
		// Losing this insert means the same signed payload already had an
		// economic effect elsewhere; surface the replay and park the
		// record as failed.
		let key = NonceKey::new(
			&processing.owner_id,
			&processing.token_address,
			processing.chain_id,
		);
		if let Err(e) = self.nonces.mark_nonce_used(&key, processing.nonce).await {
			self.transition_with(id, AuthorizationStatus::Failed, |auth| {
				auth.error_code = Some("NONCE_USED".to_string());
				auth.error_message = Some("nonce was already consumed".to_string());
			})
			.await?;
			self.audit
				.record(
					AuditEntityType::Authorization,
					id,
					"nonce_conflict",
					serde_json::json!({
						"nonce": processing.nonce,
						"error_code": "NONCE_USED",
					}),
				)
				.await
				.map_err(|e| AuthorizationError::Storage(e.to_string()))?;
			return Err(e.into());
		}

		let receipt = match outcome {
			RelayOutcome::Confirmed { transaction_hash } => {
				let tx = transaction_hash.clone();
				let completed = self
					.transition_with(id, AuthorizationStatus::Completed, move |auth| {
						auth.transaction_hash = Some(tx.clone());
					})
					.await?;

				self.audit
					.record(
						AuditEntityType::Authorization,
						id,
						"executed",
						serde_json::json!({
							"relayer_address": relayer_address,
							"relayer_fee": fee,
							"transaction_hash": transaction_hash,
						}),
					)
					.await
					.map_err(|e| AuthorizationError::Storage(e.to_string()))?;

				tracing::info!(
					authorization_id = %truncate_id(id),
					relayer_fee = %fee,
					"Executed authorization"
				);

				ExecutionReceipt {
					status: completed.status,
					transaction_hash: completed.transaction_hash,
					relayer_fee: fee,
				}
			}
			RelayOutcome::Failed {
				error_code,
				error_message,
			} => {
				let code = error_code.clone();
				let message = error_message.clone();
				let failed = self
					.transition_with(id, AuthorizationStatus::Failed, move |auth| {
						auth.error_code = Some(code.clone());
						auth.error_message = Some(message.clone());
					})
					.await?;

				self.audit
					.record(
						AuditEntityType::Authorization,
						id,
						"execution_failed",
						serde_json::json!({
							"relayer_address": relayer_address,
							"error_code": error_code,
							"error_message": error_message,
						}),
					)
					.await
					.map_err(|e| AuthorizationError::Storage(e.to_string()))?;

				tracing::warn!(
					authorization_id = %truncate_id(id),
					error_code = %error_code,
					"Authorization relay failed"
				);

				ExecutionReceipt {
					status: failed.status,
					transaction_hash: None,
					relayer_fee: fee,
				}
			}
		};

		Ok(receipt)
	}

	/// Fetches an authorization, enforcing ownership.
	///
	/// Owner mismatch reads as NotFound, identically to a missing record.
	pub async fn get_status(
		&self,
		id: &str,
		owner_id: &str,
	) -> Result<Authorization, AuthorizationError> {
		let authorization: Authorization = self
			.storage
			.retrieve(StorageKey::Authorizations.as_str(), id)
			.await?;

		if authorization.owner_id != owner_id {
			return Err(AuthorizationError::NotFound);
		}

		Ok(authorization)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relayer_storage::implementations::memory::MemoryStorage;

	struct Fixture {
		machine: AuthorizationStateMachine,
		nonces: Arc<NonceLedger>,
		audit: Arc<AuditLog>,
	}

	fn fixture_with_fees(fees: FeeConfig) -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let nonces = Arc::new(NonceLedger::new(Arc::clone(&storage)));
		let audit = Arc::new(AuditLog::new(Arc::clone(&storage)));
		let machine = AuthorizationStateMachine::new(
			storage,
			Arc::clone(&nonces),
			Arc::clone(&audit),
			fees,
		);
		Fixture {
			machine,
			nonces,
			audit,
		}
	}

	fn fixture() -> Fixture {
		fixture_with_fees(FeeConfig::default())
	}

	async fn create_pending(fx: &Fixture) -> Authorization {
		let key = NonceKey::new("owner-1", "0xToken", 8453);
		let nonce = fx.nonces.increment_nonce(&key).await.unwrap();
		fx.machine
			.create(AuthorizationRequest {
				owner_id: "owner-1".into(),
				token_address: "0xToken".into(),
				chain_id: 8453,
				nonce,
				amount: "1000000".into(),
				valid_after: 0,
				valid_before: u64::MAX,
			})
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_create_is_pending_and_audited() {
		let fx = fixture();
		let auth = create_pending(&fx).await;
		assert_eq!(auth.status, AuthorizationStatus::Pending);
		assert_eq!(auth.nonce, 1);

		let entries = fx.audit.entries_for(&auth.id).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].action, "created");
	}

	#[tokio::test]
	async fn test_create_rejects_unallocated_nonce() {
		let fx = fixture();
		let err = fx
			.machine
			.create(AuthorizationRequest {
				owner_id: "owner-1".into(),
				token_address: "0xToken".into(),
				chain_id: 8453,
				nonce: 5,
				amount: "1000".into(),
				valid_after: 0,
				valid_before: u64::MAX,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, AuthorizationError::InvalidRequest(_)));
	}

	#[tokio::test]
	async fn test_create_rejects_bad_amount() {
		let fx = fixture();
		let key = NonceKey::new("owner-1", "0xToken", 8453);
		let nonce = fx.nonces.increment_nonce(&key).await.unwrap();
		let err = fx
			.machine
			.create(AuthorizationRequest {
				owner_id: "owner-1".into(),
				token_address: "0xToken".into(),
				chain_id: 8453,
				nonce,
				amount: "12.5".into(),
				valid_after: 0,
				valid_before: u64::MAX,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, AuthorizationError::Fee(FeeError::InvalidAmount(_))));
	}

	#[tokio::test]
	async fn test_execute_confirmed_completes_with_fee() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		let receipt = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap();

		assert_eq!(receipt.status, AuthorizationStatus::Completed);
		assert_eq!(receipt.transaction_hash.as_deref(), Some("0xabc"));
		// 1000000 * 50 / 10000
		assert_eq!(receipt.relayer_fee, "5000");

		// Nonce is consumed
		let key = NonceKey::new("owner-1", "0xToken", 8453);
		assert!(fx.nonces.is_nonce_used(&key, auth.nonce).await.unwrap());

		let stored = fx.machine.get_status(&auth.id, "owner-1").await.unwrap();
		assert_eq!(stored.status, AuthorizationStatus::Completed);
		assert_eq!(stored.relayer_address.as_deref(), Some("0xRelayer"));
		assert_eq!(stored.relayer_fee.as_deref(), Some("5000"));
	}

	#[tokio::test]
	async fn test_execute_failed_outcome_records_error() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		let receipt = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Failed {
					error_code: "REVERTED".into(),
					error_message: "transfer reverted on-chain".into(),
				},
			)
			.await
			.unwrap();

		assert_eq!(receipt.status, AuthorizationStatus::Failed);
		assert!(receipt.transaction_hash.is_none());

		let stored = fx.machine.get_status(&auth.id, "owner-1").await.unwrap();
		assert_eq!(stored.error_code.as_deref(), Some("REVERTED"));

		// Even a failed relay consumed the nonce slot
		let key = NonceKey::new("owner-1", "0xToken", 8453);
		assert!(fx.nonces.is_nonce_used(&key, auth.nonce).await.unwrap());
	}

	#[tokio::test]
	async fn test_execute_with_fee_cap_breach_leaves_pending() {
		let fx = fixture_with_fees(FeeConfig {
			default_bps: 50,
			fee_cap: Some("1000".into()),
		});
		let auth = create_pending(&fx).await;

		let err = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			AuthorizationError::Fee(FeeError::FeeExceedsCap { .. })
		));

		// Rejected before any transition
		let stored = fx.machine.get_status(&auth.id, "owner-1").await.unwrap();
		assert_eq!(stored.status, AuthorizationStatus::Pending);
	}

	#[tokio::test]
	async fn test_cancel_consumes_nonce_and_blocks_execute() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		let cancelled = fx.machine.cancel(&auth.id, "owner-1").await.unwrap();
		assert_eq!(cancelled.status, AuthorizationStatus::Cancelled);

		let key = NonceKey::new("owner-1", "0xToken", 8453);
		assert!(fx.nonces.is_nonce_used(&key, auth.nonce).await.unwrap());

		// Terminal: execute must fail with InvalidState
		let err = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			AuthorizationError::InvalidState {
				from: AuthorizationStatus::Cancelled,
				to: AuthorizationStatus::Processing,
			}
		));
	}

	#[tokio::test]
	async fn test_cancel_requires_owner() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		let err = fx.machine.cancel(&auth.id, "intruder").await.unwrap_err();
		assert!(matches!(err, AuthorizationError::Unauthorized));

		let stored = fx.machine.get_status(&auth.id, "owner-1").await.unwrap();
		assert_eq!(stored.status, AuthorizationStatus::Pending);
	}

	#[tokio::test]
	async fn test_cancel_is_not_repeatable() {
		let fx = fixture();
		let auth = create_pending(&fx).await;
		fx.machine.cancel(&auth.id, "owner-1").await.unwrap();

		let err = fx.machine.cancel(&auth.id, "owner-1").await.unwrap_err();
		assert!(matches!(err, AuthorizationError::InvalidState { .. }));
	}

	#[tokio::test]
	async fn test_get_status_collapses_ownership_into_not_found() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		assert!(fx.machine.get_status(&auth.id, "owner-1").await.is_ok());
		assert!(matches!(
			fx.machine.get_status(&auth.id, "intruder").await,
			Err(AuthorizationError::NotFound)
		));
		assert!(matches!(
			fx.machine.get_status("missing", "owner-1").await,
			Err(AuthorizationError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_execute_audits_every_transition() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		fx.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap();

		let actions: Vec<String> = fx
			.audit
			.entries_for(&auth.id)
			.await
			.unwrap()
			.into_iter()
			.map(|e| e.action)
			.collect();
		assert_eq!(actions, vec!["created", "processing", "executed"]);
	}

	#[tokio::test]
	async fn test_nonce_conflict_parks_as_failed_and_audits() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		// Same nonce already consumed elsewhere; the unique constraint
		// must reject this execution at consumption time
		let key = NonceKey::new("owner-1", "0xToken", 8453);
		fx.nonces.mark_nonce_used(&key, auth.nonce).await.unwrap();

		let err = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			AuthorizationError::Nonce(NonceError::DuplicateNonce { .. })
		));

		let stored = fx.machine.get_status(&auth.id, "owner-1").await.unwrap();
		assert_eq!(stored.status, AuthorizationStatus::Failed);
		assert_eq!(stored.error_code.as_deref(), Some("NONCE_USED"));

		let actions: Vec<String> = fx
			.audit
			.entries_for(&auth.id)
			.await
			.unwrap()
			.into_iter()
			.map(|e| e.action)
			.collect();
		assert_eq!(actions, vec!["created", "processing", "nonce_conflict"]);
	}

	#[tokio::test]
	async fn test_double_execute_rejected() {
		let fx = fixture();
		let auth = create_pending(&fx).await;

		fx.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xabc".into(),
				},
			)
			.await
			.unwrap();

		let err = fx
			.machine
			.execute(
				&auth.id,
				"0xRelayer",
				RelayOutcome::Confirmed {
					transaction_hash: "0xdef".into(),
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(err, AuthorizationError::InvalidState { .. }));
	}
}
