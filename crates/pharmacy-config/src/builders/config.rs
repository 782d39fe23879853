//! Fluent builder producing an in-memory `Config`.

use crate::{
	ApiConfig, AppConfig, AuthConfig, CatalogConfig, Config, MediaConfig, ProductSeed,
	StorageConfig,
};
use std::collections::HashMap;

/// Builds a configuration wired to the in-memory backends.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	app_id: String,
	refresh_interval_seconds: u64,
	staff_emails: Vec<String>,
	signed_url_ttl_seconds: u64,
	max_upload_bytes: usize,
	products: Vec<ProductSeed>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			app_id: "test-pharmacy".to_string(),
			refresh_interval_seconds: 1,
			staff_emails: vec!["staff@pharmacy.test".to_string()],
			signed_url_ttl_seconds: 60,
			max_upload_bytes: 1024 * 1024,
			products: Vec::new(),
			api: None,
		}
	}

	pub fn app_id(mut self, id: impl Into<String>) -> Self {
		self.app_id = id.into();
		self
	}

	pub fn refresh_interval_seconds(mut self, seconds: u64) -> Self {
		self.refresh_interval_seconds = seconds;
		self
	}

	pub fn staff_email(mut self, email: impl Into<String>) -> Self {
		self.staff_emails.push(email.into());
		self
	}

	pub fn signed_url_ttl_seconds(mut self, seconds: u64) -> Self {
		self.signed_url_ttl_seconds = seconds;
		self
	}

	pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
		self.max_upload_bytes = bytes;
		self
	}

	pub fn product(mut self, product: ProductSeed) -> Self {
		self.products.push(product);
		self
	}

	pub fn api(mut self, api: ApiConfig) -> Self {
		self.api = Some(api);
		self
	}

	pub fn build(self) -> Config {
		let empty = || toml::Value::Table(toml::map::Map::new());

		let mut auth_local = toml::map::Map::new();
		auth_local.insert(
			"staff_emails".to_string(),
			toml::Value::Array(
				self.staff_emails
					.into_iter()
					.map(toml::Value::String)
					.collect(),
			),
		);

		Config {
			app: AppConfig {
				id: self.app_id,
				refresh_interval_seconds: self.refresh_interval_seconds,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
				cleanup_interval_seconds: 60,
			},
			auth: AuthConfig {
				primary: "local".to_string(),
				implementations: HashMap::from([(
					"local".to_string(),
					toml::Value::Table(auth_local),
				)]),
			},
			media: MediaConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
				bucket: "prescriptions".to_string(),
				signed_url_ttl_seconds: self.signed_url_ttl_seconds,
				max_upload_bytes: self.max_upload_bytes,
				signing_secret: "test-signing-secret-0123456789".into(),
				public_base_url: "http://127.0.0.1:3000".to_string(),
			},
			api: self.api,
			catalog: CatalogConfig {
				products: self.products,
			},
		}
	}
}
