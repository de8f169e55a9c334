//! Storage-related types for the relayer system.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing payment authorizations
	Authorizations,
	/// Key for storing cross-chain transfers
	CrossChainTransactions,
	/// Key for storing batch payments
	Batches,
	/// Key for storing payment items
	PaymentItems,
	/// Key for per-(owner, token, chain) nonce counters
	NonceCounters,
	/// Key for consumed-nonce records (unique-constrained)
	UsedNonces,
	/// Key for idempotency reservations
	IdempotencyKeys,
	/// Key for the append-only audit log
	AuditLog,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Authorizations => "authorizations",
			StorageKey::CrossChainTransactions => "cross_chain_transactions",
			StorageKey::Batches => "batches",
			StorageKey::PaymentItems => "payment_items",
			StorageKey::NonceCounters => "nonce_counters",
			StorageKey::UsedNonces => "used_nonces",
			StorageKey::IdempotencyKeys => "idempotency_keys",
			StorageKey::AuditLog => "audit_log",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Authorizations,
			Self::CrossChainTransactions,
			Self::Batches,
			Self::PaymentItems,
			Self::NonceCounters,
			Self::UsedNonces,
			Self::IdempotencyKeys,
			Self::AuditLog,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"authorizations" => Ok(Self::Authorizations),
			"cross_chain_transactions" => Ok(Self::CrossChainTransactions),
			"batches" => Ok(Self::Batches),
			"payment_items" => Ok(Self::PaymentItems),
			"nonce_counters" => Ok(Self::NonceCounters),
			"used_nonces" => Ok(Self::UsedNonces),
			"idempotency_keys" => Ok(Self::IdempotencyKeys),
			"audit_log" => Ok(Self::AuditLog),
			_ => Err(()),
		}
	}
}
