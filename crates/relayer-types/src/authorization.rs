//! Payment authorization types for the relayer system.
//!
//! An authorization is a signed, off-chain payment instruction awaiting
//! on-chain relay. These types track it from creation through settlement
//! or cancellation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A signed payment authorization tracked through its relay lifecycle.
///
/// Created in `Pending` state once the owner's signature has been accepted.
/// Transitions are one-directional; `Completed`, `Failed` and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
	/// Unique identifier for this authorization.
	pub id: String,
	/// Identifier of the owner that signed the payment instruction.
	pub owner_id: String,
	/// Address of the token being transferred.
	pub token_address: String,
	/// Chain the authorization settles on.
	pub chain_id: u64,
	/// Nonce embedded in the signed payload, allocated by the nonce ledger.
	pub nonce: u64,
	/// Transfer amount as a base-10 integer string (token base units).
	pub amount: String,
	/// Current lifecycle status.
	pub status: AuthorizationStatus,
	/// Address of the relayer that picked up this authorization.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub relayer_address: Option<String>,
	/// Fee owed to the relayer, as a base-10 integer string.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub relayer_fee: Option<String>,
	/// Hash of the on-chain settlement transaction.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub transaction_hash: Option<String>,
	/// Machine-readable error code when the relay failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_code: Option<String>,
	/// Human-readable error message when the relay failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	/// Unix timestamp before which the signed payload is not valid.
	pub valid_after: u64,
	/// Unix timestamp after which the signed payload expires.
	pub valid_before: u64,
	/// Timestamp when this authorization was created.
	pub created_at: u64,
	/// Timestamp when this authorization was last updated.
	pub updated_at: u64,
}

/// Status of a payment authorization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
	/// Accepted and awaiting relay.
	Pending,
	/// Handed to a relayer, awaiting on-chain confirmation.
	Processing,
	/// Settled on-chain.
	Completed,
	/// Relay or validation failed.
	Failed,
	/// Cancelled by the owner before relay.
	Cancelled,
}

impl AuthorizationStatus {
	/// Returns true for states with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			AuthorizationStatus::Completed
				| AuthorizationStatus::Failed
				| AuthorizationStatus::Cancelled
		)
	}
}

impl fmt::Display for AuthorizationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AuthorizationStatus::Pending => write!(f, "Pending"),
			AuthorizationStatus::Processing => write!(f, "Processing"),
			AuthorizationStatus::Completed => write!(f, "Completed"),
			AuthorizationStatus::Failed => write!(f, "Failed"),
			AuthorizationStatus::Cancelled => write!(f, "Cancelled"),
		}
	}
}

/// Caller-supplied outcome of an on-chain relay attempt.
///
/// The state machine never polls the chain itself; completion or failure
/// is always signalled explicitly through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RelayOutcome {
	/// The relay transaction confirmed on-chain.
	Confirmed {
		/// Hash of the confirmed transaction.
		transaction_hash: String,
	},
	/// The relay failed before or during confirmation.
	Failed {
		/// Machine-readable error code.
		error_code: String,
		/// Human-readable error description.
		error_message: String,
	},
}

/// Result of executing an authorization, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReceipt {
	/// Final status after applying the relay outcome.
	pub status: AuthorizationStatus,
	/// Transaction hash when the relay confirmed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub transaction_hash: Option<String>,
	/// Relayer fee charged for this execution.
	pub relayer_fee: String,
}
