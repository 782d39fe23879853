//! In-memory object storage, for tests and local development.

use crate::{MediaError, MediaInterface, MediaObject};
use async_trait::async_trait;
use pharmacy_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemoryMedia {
	objects: Arc<RwLock<HashMap<(String, String), MediaObject>>>,
}

impl MemoryMedia {
	pub fn new() -> Self {
		Self {
			objects: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryMedia {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl MediaInterface for MemoryMedia {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryMediaSchema)
	}

	async fn upload(
		&self,
		bucket: &str,
		key: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, MediaError> {
		let mut objects = self.objects.write().await;
		objects.insert(
			(bucket.to_string(), key.to_string()),
			MediaObject {
				bytes,
				content_type: content_type.to_string(),
			},
		);
		Ok(key.to_string())
	}

	async fn download(&self, bucket: &str, key: &str) -> Result<MediaObject, MediaError> {
		let objects = self.objects.read().await;
		objects
			.get(&(bucket.to_string(), key.to_string()))
			.cloned()
			.ok_or_else(|| MediaError::NotFound(format!("{}/{}", bucket, key)))
	}
}

pub struct MemoryMediaSchema;

impl ConfigSchema for MemoryMediaSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![]).validate(config)
	}
}

pub fn create_media(config: &toml::Value) -> Result<Box<dyn MediaInterface>, MediaError> {
	MemoryMediaSchema
		.validate(config)
		.map_err(|e| MediaError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryMedia::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::MediaFactory;

	fn factory() -> Self::Factory {
		create_media
	}
}

impl crate::MediaRegistry for Registry {}
