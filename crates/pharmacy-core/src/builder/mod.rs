//! Builder for assembling a [`PharmacyEngine`] from configuration.
//!
//! Each component section of the config names a `primary` implementation
//! among its `implementations`. Every configured implementation with a
//! registered factory is constructed, so a broken table fails start-up even
//! when it is not the primary one.

use crate::engine::{event_bus::EventBus, PharmacyEngine};
use pharmacy_auth::{AuthError, AuthInterface, AuthService};
use pharmacy_config::Config;
use pharmacy_media::{MediaError, MediaInterface, MediaService};
use pharmacy_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the engine's broadcast channel.
const EVENT_BUS_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions keyed by implementation name.
pub struct PharmacyFactories<SF, AF, MF> {
	pub storage_factories: HashMap<String, SF>,
	pub auth_factories: HashMap<String, AF>,
	pub media_factories: HashMap<String, MF>,
}

pub struct PharmacyBuilder {
	config: Config,
}

impl PharmacyBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, AF, MF>(
		self,
		factories: PharmacyFactories<SF, AF, MF>,
	) -> Result<PharmacyEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value, Arc<StorageService>) -> Result<Box<dyn AuthInterface>, AuthError>,
		MF: Fn(&toml::Value) -> Result<Box<dyn MediaInterface>, MediaError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
			|factory, config| factory(config),
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let auth_backend = load_primary(
			"auth",
			&self.config.auth.primary,
			&self.config.auth.implementations,
			&factories.auth_factories,
			|factory, config| factory(config, storage.clone()),
		)?;
		let auth = Arc::new(AuthService::new(auth_backend));

		let media_backend = load_primary(
			"media",
			&self.config.media.primary,
			&self.config.media.implementations,
			&factories.media_factories,
			|factory, config| factory(config),
		)?;
		let media = Arc::new(MediaService::new(
			media_backend,
			self.config.media.signing_secret.clone(),
			self.config.media.public_base_url.clone(),
		));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

		Ok(PharmacyEngine::new(
			self.config,
			storage,
			auth,
			media,
			event_bus,
		))
	}
}

/// Constructs every configured implementation of one component and returns
/// the primary.
fn load_primary<F, T, E>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	create: impl Fn(&F, &toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError>
where
	E: Display,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match create(factory, config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}
