//! Main entry point for the pharmacy delivery service.
//!
//! `serve` runs the engine and, when enabled, the HTTP API. `watch` signs in
//! as a staff member and follows the order dashboard from the terminal.

use clap::{Parser, Subcommand};
use pharmacy_config::Config;
use pharmacy_core::{PharmacyBuilder, PharmacyEngine, PharmacyFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;
mod watch;

use pharmacy_auth::implementations::local::create_auth as create_local_auth;
use pharmacy_media::implementations::local::create_media as create_local_media;
use pharmacy_media::implementations::memory::create_media as create_memory_media;
use pharmacy_storage::implementations::file::create_storage as create_file_storage;
use pharmacy_storage::implementations::memory::create_storage as create_memory_storage;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
	/// Run the engine and the HTTP API (default)
	Serve,
	/// Follow the staff dashboard, reloading on a timer and on order events
	Watch {
		/// Staff account email
		#[arg(long, env = "PHARMACY_STAFF_EMAIL")]
		email: String,
		/// Staff account password
		#[arg(long, env = "PHARMACY_STAFF_PASSWORD", hide_env_values = true)]
		password: String,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.app.id);

	let engine = Arc::new(build_engine(config.clone())?);
	engine.initialize().await?;

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(engine.clone(), &config).await?,
		Command::Watch { email, password } => {
			watch::run(engine.clone(), &email, password.into()).await?
		},
	}

	engine.shutdown().await?;
	tracing::info!("Stopped pharmacy service");
	Ok(())
}

async fn serve(
	engine: Arc<PharmacyEngine>,
	config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
	match config.api.as_ref().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config.clone(), engine.clone());

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("API disabled, running engine only");
			engine.run().await?;
		},
	}
	Ok(())
}

/// Builds a factory map, coercing each entry to the factory signature.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};

    // Auth backends also receive the record store.
    ($interface:path, $error:path, storage, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(
                    &toml::Value,
                    std::sync::Arc<pharmacy_storage::StorageService>,
                ) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

fn build_engine(config: Config) -> Result<PharmacyEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		pharmacy_storage::StorageInterface,
		pharmacy_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let auth_factories = create_factory_map!(
		pharmacy_auth::AuthInterface,
		pharmacy_auth::AuthError,
		storage,
		"local" => create_local_auth,
	);

	let media_factories = create_factory_map!(
		pharmacy_media::MediaInterface,
		pharmacy_media::MediaError,
		"local" => create_local_media,
		"memory" => create_memory_media,
	);

	let factories = PharmacyFactories {
		storage_factories,
		auth_factories,
		media_factories,
	};

	Ok(PharmacyBuilder::new(config).build(factories)?)
}
