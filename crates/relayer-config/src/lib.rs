//! Configuration module for the payment relayer system.
//!
//! This module provides structures and utilities for managing relayer
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set before the engine starts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the payment relayer.
///
/// Contains all configuration sections required for the engine to operate:
/// relayer identity, fee parameters, the storage backend, and the periodic
/// sweep cadences.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the relayer instance.
	pub relayer: RelayerConfig,
	/// Fee computation parameters.
	#[serde(default)]
	pub fees: FeeConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Cadences and thresholds for the periodic sweeps.
	#[serde(default)]
	pub sweeps: SweepConfig,
}

/// Configuration specific to the relayer instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Unique identifier for this relayer instance.
	pub id: String,
}

/// Fee computation parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeeConfig {
	/// Default relayer fee in basis points.
	#[serde(default = "default_fee_bps")]
	pub default_bps: u32,
	/// Optional upper bound on the computed fee, as a base-10 integer
	/// string in token base units. Breaching the cap rejects the
	/// operation; the fee is never silently clamped.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fee_cap: Option<String>,
}

impl Default for FeeConfig {
	fn default() -> Self {
		Self {
			default_bps: default_fee_bps(),
			fee_cap: None,
		}
	}
}

/// Returns the default relayer fee of 50 basis points (0.5%).
fn default_fee_bps() -> u32 {
	50
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

/// Returns the default cleanup interval of one hour.
fn default_cleanup_interval() -> u64 {
	3600
}

/// Cadences and thresholds for the periodic sweeps.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
	/// Interval in seconds between batch retry sweeps.
	#[serde(default = "default_batch_retry_interval")]
	pub batch_retry_interval_seconds: u64,
	/// Maximum retry attempts per payment item.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Interval in seconds between stalled-transfer sweeps.
	#[serde(default = "default_stall_check_interval")]
	pub stall_check_interval_seconds: u64,
	/// Staleness threshold in minutes before a transfer is a stall candidate.
	#[serde(default = "default_stall_threshold")]
	pub stall_threshold_minutes: u64,
	/// Fallback completion estimate in seconds for transfers without one.
	#[serde(default = "default_estimate_seconds")]
	pub default_estimate_seconds: u64,
}

impl Default for SweepConfig {
	fn default() -> Self {
		Self {
			batch_retry_interval_seconds: default_batch_retry_interval(),
			max_retries: default_max_retries(),
			stall_check_interval_seconds: default_stall_check_interval(),
			stall_threshold_minutes: default_stall_threshold(),
			default_estimate_seconds: default_estimate_seconds(),
		}
	}
}

/// Batch retry sweep runs every 5 minutes.
fn default_batch_retry_interval() -> u64 {
	300
}

/// Payment items get three retry attempts by default.
fn default_max_retries() -> u32 {
	3
}

/// Stalled-transfer sweep runs every 10 minutes.
fn default_stall_check_interval() -> u64 {
	600
}

/// Transfers untouched for 30 minutes become stall candidates.
fn default_stall_threshold() -> u64 {
	30
}

/// Default completion estimate of 10 minutes for transfers without one.
fn default_estimate_seconds() -> u64 {
	600
}

impl Config {
	/// Parses configuration from a TOML string and validates it.
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads configuration from a file synchronously.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		Self::from_toml_str(&content)
	}

	/// Loads configuration from a file asynchronously.
	pub async fn from_file_async<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		Self::from_toml_str(&content)
	}

	/// Validates cross-field constraints that serde defaults can't express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.is_empty() {
			return Err(ConfigError::Validation(
				"relayer.id must not be empty".into(),
			));
		}

		if self.fees.default_bps == 0 || self.fees.default_bps > 10_000 {
			return Err(ConfigError::Validation(format!(
				"fees.default_bps must be in (0, 10000], got {}",
				self.fees.default_bps
			)));
		}
		if let Some(cap) = &self.fees.fee_cap {
			if cap.is_empty() || !cap.bytes().all(|b| b.is_ascii_digit()) {
				return Err(ConfigError::Validation(format!(
					"fees.fee_cap must be a base-10 integer string, got {:?}",
					cap
				)));
			}
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"storage.primary must not be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"storage.primary '{}' has no [storage.implementations.{}] section",
				self.storage.primary, self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"storage.cleanup_interval_seconds must be positive".into(),
			));
		}

		let sweeps = &self.sweeps;
		if sweeps.batch_retry_interval_seconds == 0 || sweeps.stall_check_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"sweep intervals must be positive".into(),
			));
		}
		if sweeps.stall_threshold_minutes == 0 {
			return Err(ConfigError::Validation(
				"sweeps.stall_threshold_minutes must be positive".into(),
			));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const MINIMAL: &str = r#"
		[relayer]
		id = "relayer-1"

		[storage]
		primary = "memory"
		[storage.implementations.memory]
	"#;

	#[test]
	fn test_minimal_config_gets_defaults() {
		let config = Config::from_toml_str(MINIMAL).unwrap();
		assert_eq!(config.relayer.id, "relayer-1");
		assert_eq!(config.fees.default_bps, 50);
		assert_eq!(config.fees.fee_cap, None);
		assert_eq!(config.storage.cleanup_interval_seconds, 3600);
		assert_eq!(config.sweeps.batch_retry_interval_seconds, 300);
		assert_eq!(config.sweeps.max_retries, 3);
		assert_eq!(config.sweeps.stall_check_interval_seconds, 600);
		assert_eq!(config.sweeps.stall_threshold_minutes, 30);
		assert_eq!(config.sweeps.default_estimate_seconds, 600);
	}

	#[test]
	fn test_full_config() {
		let config = Config::from_toml_str(
			r#"
			[relayer]
			id = "relayer-1"

			[fees]
			default_bps = 30
			fee_cap = "1000000"

			[storage]
			primary = "file"
			cleanup_interval_seconds = 1800
			[storage.implementations.file]
			storage_path = "/tmp/relayer"

			[sweeps]
			batch_retry_interval_seconds = 60
			max_retries = 5
			stall_check_interval_seconds = 120
			stall_threshold_minutes = 15
			default_estimate_seconds = 300
			"#,
		)
		.unwrap();
		assert_eq!(config.fees.default_bps, 30);
		assert_eq!(config.fees.fee_cap.as_deref(), Some("1000000"));
		assert_eq!(config.storage.primary, "file");
		assert_eq!(config.sweeps.max_retries, 5);
	}

	#[test]
	fn test_primary_without_implementation_section_fails() {
		let err = Config::from_toml_str(
			r#"
			[relayer]
			id = "relayer-1"

			[storage]
			primary = "file"
			"#,
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_bps_bounds() {
		let toml = MINIMAL.to_string() + "\n[fees]\ndefault_bps = 0\n";
		assert!(matches!(
			Config::from_toml_str(&toml),
			Err(ConfigError::Validation(_))
		));

		let toml = MINIMAL.to_string() + "\n[fees]\ndefault_bps = 10001\n";
		assert!(matches!(
			Config::from_toml_str(&toml),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_non_numeric_cap_rejected() {
		let toml = MINIMAL.to_string() + "\n[fees]\nfee_cap = \"1e6\"\n";
		assert!(matches!(
			Config::from_toml_str(&toml),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();
		let config = Config::from_file(file.path()).unwrap();
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_from_file_async() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();
		let config = Config::from_file_async(file.path()).await.unwrap();
		assert_eq!(config.relayer.id, "relayer-1");
	}
}
