//! Utility functions shared across relayer crates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock reports a time before the epoch,
/// which only happens on a badly misconfigured host.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Truncates an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
/// Counts characters, not bytes, so multi-byte ids never split mid-char.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((byte_offset, _)) => format!("{}..", &id[..byte_offset]),
		None => id.to_string(),
	}
}
