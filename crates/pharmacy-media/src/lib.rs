//! Object storage for uploaded prescriptions.
//!
//! Backends implement [`MediaInterface`] and only move bytes. Access for
//! browsers goes through short-lived signed URLs issued and checked by
//! [`MediaService`]:
//!
//! ```text
//! {public_base_url}/media/{bucket}/{key}?expires={unix}&signature={hex}
//! ```
//!
//! where the signature is HMAC-SHA3-256 over `"{bucket}\n{key}\n{expires}"`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use pharmacy_types::{current_timestamp, ConfigSchema, ImplementationRegistry, SecretString};
use sha3::Sha3_256;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod local;
	pub mod memory;
}

type HmacSha3 = Hmac<Sha3_256>;

#[derive(Debug, Error)]
pub enum MediaError {
	#[error("Object not found: {0}")]
	NotFound(String),
	#[error("Invalid object key: {0}")]
	InvalidKey(String),
	#[error("Upload failed: {0}")]
	Upload(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Signed URL expired")]
	Expired,
	#[error("Invalid signature")]
	InvalidSignature,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A stored object with its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaObject {
	pub bytes: Vec<u8>,
	pub content_type: String,
}

#[async_trait]
pub trait MediaInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Stores an object, returning the key it was stored under.
	async fn upload(
		&self,
		bucket: &str,
		key: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, MediaError>;

	async fn download(&self, bucket: &str, key: &str) -> Result<MediaObject, MediaError>;
}

pub type MediaFactory = fn(&toml::Value) -> Result<Box<dyn MediaInterface>, MediaError>;

pub trait MediaRegistry: ImplementationRegistry<Factory = MediaFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, MediaFactory)> {
	use implementations::{local, memory};

	vec![
		(local::Registry::NAME, local::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Rejects bucket names and keys that could escape their directory or need
/// URL escaping.
///
/// Allowed: ASCII alphanumerics, `.`, `-`, `_` and `/` between non-empty
/// segments. `.` and `..` segments are refused.
pub fn validate_object_path(bucket: &str, key: &str) -> Result<(), MediaError> {
	let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');

	if bucket.is_empty() || !bucket.chars().all(safe) || bucket == "." || bucket == ".." {
		return Err(MediaError::InvalidKey(format!("bad bucket '{}'", bucket)));
	}
	if key.is_empty() {
		return Err(MediaError::InvalidKey("empty key".into()));
	}
	for segment in key.split('/') {
		if segment.is_empty() || segment == "." || segment == ".." || !segment.chars().all(safe) {
			return Err(MediaError::InvalidKey(key.to_string()));
		}
	}
	Ok(())
}

/// A URL granting temporary read access to one object.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
	pub url: String,
	pub expires_at: DateTime<Utc>,
}

pub struct MediaService {
	implementation: Box<dyn MediaInterface>,
	signing_secret: SecretString,
	public_base_url: String,
}

impl MediaService {
	pub fn new(
		implementation: Box<dyn MediaInterface>,
		signing_secret: SecretString,
		public_base_url: impl Into<String>,
	) -> Self {
		Self {
			implementation,
			signing_secret,
			public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
		}
	}

	pub async fn upload(
		&self,
		bucket: &str,
		key: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, MediaError> {
		validate_object_path(bucket, key)?;
		let size = bytes.len();
		let stored = self
			.implementation
			.upload(bucket, key, bytes, content_type)
			.await?;
		tracing::info!(bucket = %bucket, key = %stored, size, content_type = %content_type, "Stored object");
		Ok(stored)
	}

	pub async fn download(&self, bucket: &str, key: &str) -> Result<MediaObject, MediaError> {
		validate_object_path(bucket, key)?;
		self.implementation.download(bucket, key).await
	}

	fn mac(&self, bucket: &str, key: &str, expires: u64) -> Result<HmacSha3, MediaError> {
		let mut mac = HmacSha3::new_from_slice(self.signing_secret.as_bytes())
			.map_err(|e| MediaError::Configuration(e.to_string()))?;
		mac.update(format!("{}\n{}\n{}", bucket, key, expires).as_bytes());
		Ok(mac)
	}

	/// Issues a URL for `bucket/key` valid for `ttl` from now.
	pub fn create_signed_url(
		&self,
		bucket: &str,
		key: &str,
		ttl: Duration,
	) -> Result<SignedUrl, MediaError> {
		validate_object_path(bucket, key)?;

		let expires = current_timestamp().saturating_add(ttl.as_secs());
		let signature = hex::encode(self.mac(bucket, key, expires)?.finalize().into_bytes());
		let expires_at = DateTime::<Utc>::from_timestamp(expires as i64, 0)
			.ok_or_else(|| MediaError::Configuration(format!("expiry {} out of range", expires)))?;

		Ok(SignedUrl {
			url: format!(
				"{}/media/{}/{}?expires={}&signature={}",
				self.public_base_url, bucket, key, expires, signature
			),
			expires_at,
		})
	}

	/// Checks a signature presented with a media request.
	pub fn verify_signed_url(
		&self,
		bucket: &str,
		key: &str,
		expires: u64,
		signature: &str,
	) -> Result<(), MediaError> {
		self.verify_signed_url_at(bucket, key, expires, signature, current_timestamp())
	}

	fn verify_signed_url_at(
		&self,
		bucket: &str,
		key: &str,
		expires: u64,
		signature: &str,
		now: u64,
	) -> Result<(), MediaError> {
		let provided = hex::decode(signature).map_err(|_| MediaError::InvalidSignature)?;
		self.mac(bucket, key, expires)?
			.verify_slice(&provided)
			.map_err(|_| MediaError::InvalidSignature)?;

		if now >= expires {
			return Err(MediaError::Expired);
		}
		Ok(())
	}
}
