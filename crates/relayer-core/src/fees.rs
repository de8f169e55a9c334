//! Relayer fee computation.
//!
//! Pure functions over `U256`: amounts arrive and leave as base-10 integer
//! strings in token base units, so no precision is lost on large token
//! amounts. The only rounding is the integer floor division by the basis
//! point denominator.

use alloy_primitives::U256;
use thiserror::Error;

/// Default relayer fee of 50 basis points (0.5%).
pub const DEFAULT_FEE_BPS: u32 = 50;

/// Basis point denominator.
const BPS_DENOMINATOR: u64 = 10_000;

/// Errors that can occur during fee computation.
#[derive(Debug, Error)]
pub enum FeeError {
	/// The amount (or cap) is not a non-negative base-10 integer string,
	/// or the computation overflowed.
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	/// The computed fee exceeds the configured cap. The operation is
	/// rejected outright; fees are never silently clamped.
	#[error("Fee {fee} exceeds cap {cap}")]
	FeeExceedsCap { fee: String, cap: String },
}

/// Parses a non-negative base-10 integer string into a `U256`.
fn parse_amount(value: &str) -> Result<U256, FeeError> {
	if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
		return Err(FeeError::InvalidAmount(format!(
			"'{}' is not a base-10 integer string",
			value
		)));
	}
	U256::from_str_radix(value, 10)
		.map_err(|_| FeeError::InvalidAmount(format!("'{}' exceeds 256 bits", value)))
}

/// Validates that a string is a well-formed token amount.
pub fn validate_amount(value: &str) -> Result<(), FeeError> {
	parse_amount(value).map(|_| ())
}

/// Computes the relayer fee for an amount.
///
/// `fee = floor(amount * bps / 10000)`, with `bps` defaulting to
/// [`DEFAULT_FEE_BPS`]. When `cap` is given and the fee exceeds it, the
/// computation fails with [`FeeError::FeeExceedsCap`]; the caller must
/// reduce the amount or bps, or reject the operation.
pub fn calculate_fee(amount: &str, bps: Option<u32>, cap: Option<&str>) -> Result<String, FeeError> {
	let amount = parse_amount(amount)?;
	let bps = bps.unwrap_or(DEFAULT_FEE_BPS);

	let scaled = amount
		.checked_mul(U256::from(bps))
		.ok_or_else(|| FeeError::InvalidAmount("amount too large for fee computation".into()))?;
	let fee = scaled / U256::from(BPS_DENOMINATOR);

	if let Some(cap) = cap {
		let cap_value = parse_amount(cap)?;
		if fee > cap_value {
			return Err(FeeError::FeeExceedsCap {
				fee: fee.to_string(),
				cap: cap_value.to_string(),
			});
		}
	}

	Ok(fee.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_bps() {
		assert_eq!(calculate_fee("1000000", None, None).unwrap(), "5000");
	}

	#[test]
	fn test_explicit_bps() {
		assert_eq!(calculate_fee("1000000", Some(50), None).unwrap(), "5000");
		assert_eq!(calculate_fee("1000000", Some(100), None).unwrap(), "10000");
		assert_eq!(calculate_fee("1000000", Some(1), None).unwrap(), "100");
	}

	#[test]
	fn test_floor_division() {
		// 999 * 50 / 10000 = 4.995 -> 4
		assert_eq!(calculate_fee("999", Some(50), None).unwrap(), "4");
		assert_eq!(calculate_fee("1", Some(50), None).unwrap(), "0");
		assert_eq!(calculate_fee("0", Some(50), None).unwrap(), "0");
	}

	#[test]
	fn test_large_amounts_keep_precision() {
		// 10^30 stays exact; f64 arithmetic would not
		let amount = "1000000000000000000000000000000";
		assert_eq!(
			calculate_fee(amount, Some(50), None).unwrap(),
			"5000000000000000000000000000"
		);
	}

	#[test]
	fn test_cap_within_bound() {
		assert_eq!(
			calculate_fee("1000000", Some(50), Some("5000")).unwrap(),
			"5000"
		);
	}

	#[test]
	fn test_cap_exceeded() {
		let err = calculate_fee("1000000", Some(50), Some("1000")).unwrap_err();
		match err {
			FeeError::FeeExceedsCap { fee, cap } => {
				assert_eq!(fee, "5000");
				assert_eq!(cap, "1000");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn test_invalid_amounts() {
		for bad in ["", "-5", "1.5", "1e6", "0x10", " 10", "10 "] {
			assert!(
				matches!(
					calculate_fee(bad, None, None),
					Err(FeeError::InvalidAmount(_))
				),
				"expected InvalidAmount for {bad:?}"
			);
		}
	}

	#[test]
	fn test_invalid_cap() {
		assert!(matches!(
			calculate_fee("1000", None, Some("abc")),
			Err(FeeError::InvalidAmount(_))
		));
	}
}
