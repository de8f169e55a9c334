//! Main entry point for the payment relayer service.
//!
//! This binary wires a storage backend to the relayer engine and runs the
//! engine until interrupted. Storage backends are pluggable through a
//! factory map keyed by the `storage.primary` configuration value.

use clap::Parser;
use relayer_config::Config;
use relayer_core::RelayerEngine;
use relayer_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use relayer_storage::implementations::file::create_storage as create_file_storage;
use relayer_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the relayer service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the relayer service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the storage backend and the relayer engine
/// 5. Runs the engine until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started relayer");

	// Load configuration
	let config = Config::from_file_async(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.relayer.id);

	let storage = build_storage(&config)?;
	let engine = RelayerEngine::new(config, storage);
	engine.run().await?;

	tracing::info!("Stopped relayer");
	Ok(())
}

/// Builds the configured primary storage backend.
///
/// The backend's own configuration schema validates its section before
/// the engine starts, so misconfiguration fails at startup rather than on
/// the first write.
fn build_storage(config: &Config) -> Result<Arc<StorageService>, Box<dyn std::error::Error>> {
	let mut factories: HashMap<String, StorageFactory> = HashMap::new();
	factories.insert("memory".to_string(), create_memory_storage);
	factories.insert("file".to_string(), create_file_storage);

	let name = &config.storage.primary;
	let factory = factories
		.get(name)
		.ok_or_else(|| format!("Unknown storage backend '{}'", name))?;
	let backend_config = config
		.storage
		.implementations
		.get(name)
		.ok_or_else(|| format!("Missing [storage.implementations.{}] section", name))?;

	let backend = factory(backend_config)
		.map_err(|e| format!("Failed to create storage backend '{}': {}", name, e))?;
	backend
		.config_schema()
		.validate(backend_config)
		.map_err(|e| format!("Invalid configuration for storage backend '{}': {}", name, e))?;

	tracing::info!(component = "storage", implementation = %name, "Loaded");
	Ok(Arc::new(StorageService::new(backend)))
}
