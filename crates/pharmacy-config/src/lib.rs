//! Configuration for the pharmacy delivery service.
//!
//! Configuration is read from TOML. A file may pull in others with
//! `include = ["storage.toml", ...]`; every top-level section must be defined
//! exactly once across the whole set. String values may reference the
//! environment as `${VAR}` or `${VAR:-default}`.

mod loader;

#[cfg(feature = "testing")]
pub mod builders;

use pharmacy_types::SecretString;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The full error embeds the whole input; keep only the message.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Application identity and view behavior.
	pub app: AppConfig,
	/// Record store backends.
	pub storage: StorageConfig,
	/// Authentication backends.
	pub auth: AuthConfig,
	/// Object storage backends and signed URL settings.
	pub media: MediaConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
	/// Catalog seed data.
	#[serde(default)]
	pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
	/// Identifier used in logs.
	pub id: String,
	/// Period of the polling revalidation scheduler.
	#[serde(default = "default_refresh_interval_seconds")]
	pub refresh_interval_seconds: u64,
}

fn default_refresh_interval_seconds() -> u64 {
	10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation backs the record store.
	pub primary: String,
	/// Implementation name to raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval between sweeps of expired entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Bucket holding prescription uploads.
	#[serde(default = "default_bucket")]
	pub bucket: String,
	/// Lifetime of signed prescription URLs.
	#[serde(default = "default_signed_url_ttl_seconds")]
	pub signed_url_ttl_seconds: u64,
	/// Largest accepted upload.
	#[serde(default = "default_max_upload_bytes")]
	pub max_upload_bytes: usize,
	/// Key for signing object URLs.
	pub signing_secret: SecretString,
	/// Externally reachable base URL that signed links are built on.
	#[serde(default = "default_public_base_url")]
	pub public_base_url: String,
}

fn default_bucket() -> String {
	"prescriptions".to_string()
}

fn default_signed_url_ttl_seconds() -> u64 {
	60
}

fn default_max_upload_bytes() -> usize {
	10 * 1024 * 1024
}

fn default_public_base_url() -> String {
	format!("http://{}:{}", default_api_host(), default_api_port())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Request body limit; must fit the largest upload plus form overhead.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	12 * 1024 * 1024
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
	/// Products inserted at start-up when not already present.
	#[serde(default)]
	pub products: Vec<ProductSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductSeed {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub price: Decimal,
	pub image_ref: Option<String>,
	#[serde(default)]
	pub requires_prescription: bool,
}

/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from `path`, following includes.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path.file_name().ok_or_else(|| {
			ConfigError::Validation(format!("Invalid path: {}", path.display()))
		})?;

		loader::ConfigLoader::new(base_dir)
			.load_config(file_name)
			.await
	}

	/// Checks cross-field rules serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.app.id.trim().is_empty() {
			return Err(ConfigError::Validation("App id cannot be empty".into()));
		}
		if !(1..=3600).contains(&self.app.refresh_interval_seconds) {
			return Err(ConfigError::Validation(
				"app.refresh_interval_seconds must be between 1 and 3600".into(),
			));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if !(1..=86400).contains(&self.storage.cleanup_interval_seconds) {
			return Err(ConfigError::Validation(
				"storage.cleanup_interval_seconds must be between 1 and 86400".into(),
			));
		}

		validate_primary("auth", &self.auth.primary, &self.auth.implementations)?;

		validate_primary("media", &self.media.primary, &self.media.implementations)?;
		if self.media.bucket.trim().is_empty() || self.media.bucket.contains('/') {
			return Err(ConfigError::Validation(format!(
				"Invalid media bucket name '{}'",
				self.media.bucket
			)));
		}
		if !(1..=604_800).contains(&self.media.signed_url_ttl_seconds) {
			return Err(ConfigError::Validation(
				"media.signed_url_ttl_seconds must be between 1 and 604800".into(),
			));
		}
		if self.media.max_upload_bytes == 0 {
			return Err(ConfigError::Validation(
				"media.max_upload_bytes must be greater than 0".into(),
			));
		}
		if self.media.signing_secret.len() < 16 {
			return Err(ConfigError::Validation(
				"media.signing_secret must be at least 16 characters".into(),
			));
		}
		if !self.media.public_base_url.starts_with("http://")
			&& !self.media.public_base_url.starts_with("https://")
		{
			return Err(ConfigError::Validation(
				"media.public_base_url must be an http(s) URL".into(),
			));
		}

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
			if api.max_request_size < self.media.max_upload_bytes {
				return Err(ConfigError::Validation(format!(
					"api.max_request_size ({}) must be at least media.max_upload_bytes ({})",
					api.max_request_size, self.media.max_upload_bytes
				)));
			}
		}

		let mut seen = HashSet::new();
		for product in &self.catalog.products {
			if !seen.insert(product.id.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate catalog product id '{}'",
					product.id
				)));
			}
			if product.price.is_sign_negative() {
				return Err(ConfigError::Validation(format!(
					"Catalog product '{}' has a negative price",
					product.id
				)));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a complete configuration document, resolving the environment and
/// validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
pub(crate) const MINIMAL_CONFIG: &str = r#"
[app]
id = "test-pharmacy"

[storage]
primary = "memory"
[storage.implementations.memory]

[auth]
primary = "local"
[auth.implementations.local]
staff_emails = ["staff@pharmacy.test"]

[media]
primary = "memory"
signing_secret = "0123456789abcdef0123"
[media.implementations.memory]
"#;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config: Config = MINIMAL_CONFIG.parse().unwrap();
		assert_eq!(config.app.refresh_interval_seconds, 10);
		assert_eq!(config.storage.cleanup_interval_seconds, 3600);
		assert_eq!(config.media.bucket, "prescriptions");
		assert_eq!(config.media.signed_url_ttl_seconds, 60);
		assert!(config.api.is_none());
		assert!(config.catalog.products.is_empty());
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("PHARMACY_TEST_HOST", "localhost");
		let out = resolve_env_vars("host = \"${PHARMACY_TEST_HOST}:${PHARMACY_TEST_PORT:-3000}\"")
			.unwrap();
		assert_eq!(out, "host = \"localhost:3000\"");
		std::env::remove_var("PHARMACY_TEST_HOST");
	}

	#[test]
	fn test_missing_env_var_error() {
		let err = resolve_env_vars("secret = \"${PHARMACY_TEST_UNSET_VAR}\"").unwrap_err();
		assert!(err.to_string().contains("PHARMACY_TEST_UNSET_VAR"));
	}

	#[test]
	fn test_primary_must_be_configured() {
		let input = MINIMAL_CONFIG.replace("primary = \"memory\"\n[storage", "primary = \"file\"\n[storage");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'file'"));
	}

	#[test]
	fn test_short_signing_secret_rejected() {
		let input = MINIMAL_CONFIG.replace("0123456789abcdef0123", "short");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("signing_secret"));
	}

	#[test]
	fn test_duplicate_catalog_products_rejected() {
		let input = format!(
			"{}\n{}",
			MINIMAL_CONFIG,
			r#"
[[catalog.products]]
id = "p1"
name = "Aspirin"
price = "4.50"

[[catalog.products]]
id = "p1"
name = "Aspirin again"
price = "4.50"
"#
		);
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Duplicate catalog product id 'p1'"));
	}

	#[test]
	fn test_request_size_must_fit_uploads() {
		let input = format!(
			"{}\n[api]\nenabled = true\nmax_request_size = 1024\n",
			MINIMAL_CONFIG
		);
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("max_request_size"));
	}
}
