//! Filesystem object storage.
//!
//! Objects are written to `<root_path>/<bucket>/<key>`; the content type is
//! kept beside each object in a `<key>.content-type` file. Keys are checked
//! by [`crate::validate_object_path`] before reaching this backend.

use crate::{MediaError, MediaInterface, MediaObject};
use async_trait::async_trait;
use pharmacy_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::path::{Path, PathBuf};
use tokio::fs;

const CONTENT_TYPE_SUFFIX: &str = "content-type";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub struct LocalMedia {
	root_path: PathBuf,
}

impl LocalMedia {
	pub fn new(root_path: PathBuf) -> Self {
		Self { root_path }
	}

	fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
		self.root_path.join(bucket).join(key)
	}

	fn content_type_path(path: &Path) -> PathBuf {
		let mut name = path.as_os_str().to_owned();
		name.push(".");
		name.push(CONTENT_TYPE_SUFFIX);
		PathBuf::from(name)
	}

	async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MediaError> {
		let mut temp = path.as_os_str().to_owned();
		temp.push(".tmp");
		let temp = PathBuf::from(temp);

		fs::write(&temp, bytes)
			.await
			.map_err(|e| MediaError::Upload(e.to_string()))?;
		fs::rename(&temp, path)
			.await
			.map_err(|e| MediaError::Upload(e.to_string()))
	}
}

#[async_trait]
impl MediaInterface for LocalMedia {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalMediaSchema)
	}

	async fn upload(
		&self,
		bucket: &str,
		key: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, MediaError> {
		let path = self.object_path(bucket, key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| MediaError::Upload(e.to_string()))?;
		}

		Self::write_atomic(&Self::content_type_path(&path), content_type.as_bytes()).await?;
		Self::write_atomic(&path, &bytes).await?;
		Ok(key.to_string())
	}

	async fn download(&self, bucket: &str, key: &str) -> Result<MediaObject, MediaError> {
		let path = self.object_path(bucket, key);
		let bytes = match fs::read(&path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(MediaError::NotFound(format!("{}/{}", bucket, key)))
			},
			Err(e) => return Err(MediaError::Backend(e.to_string())),
		};

		let content_type = match fs::read_to_string(Self::content_type_path(&path)).await {
			Ok(content_type) => content_type,
			Err(e) => {
				tracing::debug!(key = %key, error = %e, "Missing content type, using fallback");
				FALLBACK_CONTENT_TYPE.to_string()
			},
		};

		Ok(MediaObject {
			bytes,
			content_type,
		})
	}
}

pub struct LocalMediaSchema;

impl ConfigSchema for LocalMediaSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::required("root_path", FieldType::String)
			.with_check(|v| match v.as_str() {
				Some(s) if !s.trim().is_empty() => Ok(()),
				_ => Err("must not be empty".to_string()),
			})])
		.validate(config)
	}
}

/// Creates the filesystem media backend.
///
/// Configuration:
/// - `root_path`: directory holding one sub-directory per bucket
pub fn create_media(config: &toml::Value) -> Result<Box<dyn MediaInterface>, MediaError> {
	LocalMediaSchema
		.validate(config)
		.map_err(|e| MediaError::Configuration(e.to_string()))?;

	let root_path = config
		.get("root_path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| MediaError::Configuration("root_path is required".into()))?;

	Ok(Box::new(LocalMedia::new(PathBuf::from(root_path))))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::MediaFactory;

	fn factory() -> Self::Factory {
		create_media
	}
}

impl crate::MediaRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_upload_and_download() {
		let dir = TempDir::new().unwrap();
		let media = LocalMedia::new(dir.path().to_path_buf());

		media
			.upload("prescriptions", "prescription-1-scan.png", vec![0x89, 0x50], "image/png")
			.await
			.unwrap();
		assert!(dir
			.path()
			.join("prescriptions")
			.join("prescription-1-scan.png")
			.exists());

		let object = media
			.download("prescriptions", "prescription-1-scan.png")
			.await
			.unwrap();
		assert_eq!(object.bytes, vec![0x89, 0x50]);
		assert_eq!(object.content_type, "image/png");
	}

	#[tokio::test]
	async fn test_missing_object() {
		let dir = TempDir::new().unwrap();
		let media = LocalMedia::new(dir.path().to_path_buf());
		assert!(matches!(
			media.download("prescriptions", "nope.png").await,
			Err(MediaError::NotFound(_))
		));
	}

	#[test]
	fn test_factory_requires_root_path() {
		let empty = toml::Value::Table(toml::map::Map::new());
		assert!(matches!(
			create_media(&empty),
			Err(MediaError::Configuration(_))
		));

		let config: toml::Value = toml::from_str("root_path = \"./data/media\"").unwrap();
		assert!(create_media(&config).is_ok());
	}
}
