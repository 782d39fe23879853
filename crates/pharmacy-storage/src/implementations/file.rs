//! File-based storage backend.
//!
//! Each record lives in `<storage_path>/<collection>/<id>.bin`, prefixed by a
//! fixed-size header carrying its expiry. Writes go to a temporary file that
//! is renamed into place, so readers never observe a partial record.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use pharmacy_types::{
	current_timestamp, Collection, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Fixed-size record header.
///
/// Layout (32 bytes):
/// - `[0..4]` magic `RXPH`
/// - `[4..6]` version, u16 little-endian
/// - `[6..14]` expiry, u64 little-endian Unix seconds, 0 = never
/// - `[14..32]` reserved
#[derive(Debug, Clone, Copy, PartialEq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"RXPH";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Bad record magic".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported record version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired_at(&self, now: u64) -> bool {
		self.expires_at != 0 && now >= self.expires_at
	}
}

/// Default TTL per collection, from `ttl_<collection>` keys. Zero means none.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<Collection, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = Collection::all()
			.into_iter()
			.filter_map(|collection| {
				let seconds = config
					.get(format!("ttl_{}", collection.as_str()))
					.and_then(|v| v.as_integer())?;
				Some((collection, Duration::from_secs(seconds.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<Collection>().ok())
			.and_then(|collection| self.ttls.get(&collection).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// Escapes an id so it is a single safe path component. Reversible.
fn escape_component(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for c in raw.chars() {
		match c {
			'%' => out.push_str("%25"),
			'/' => out.push_str("%2F"),
			'\\' => out.push_str("%5C"),
			':' => out.push_str("%3A"),
			c => out.push(c),
		}
	}
	if out == "." || out == ".." {
		out = out.replace('.', "%2E");
	}
	out
}

/// Inverse of [`escape_component`], decoded in a single pass.
fn unescape_component(escaped: &str) -> String {
	let mut out = String::with_capacity(escaped.len());
	let mut rest = escaped;
	while let Some(pos) = rest.find('%') {
		out.push_str(&rest[..pos]);
		let decoded = match rest.get(pos + 1..pos + 3) {
			Some("25") => Some('%'),
			Some("2F") => Some('/'),
			Some("5C") => Some('\\'),
			Some("3A") => Some(':'),
			Some("2E") => Some('.'),
			_ => None,
		};
		match decoded {
			Some(c) => {
				out.push(c);
				rest = &rest[pos + 3..];
			},
			None => {
				out.push('%');
				rest = &rest[pos + 1..];
			},
		}
	}
	out.push_str(rest);
	out
}

/// Stores records as headered files under a base directory.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.bin`.
	fn file_path(&self, key: &str) -> PathBuf {
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(escape_component(namespace))
				.join(format!("{}.bin", escape_component(id))),
			None => self
				.base_path
				.join(format!("{}.bin", escape_component(key))),
		}
	}

	/// Reads a record file, returning its payload if it is present and live.
	async fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired_at(current_timestamp()) {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	async fn write_atomic(&self, path: &Path, payload: Vec<u8>, ttl: Duration) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let mut data = Vec::with_capacity(FileHeader::SIZE + payload.len());
		data.extend_from_slice(&FileHeader::new(ttl).serialize());
		data.extend_from_slice(&payload);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn record_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut files = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension().is_some_and(|ext| ext == "bin") {
				files.push(path);
			}
		}
		Ok(files)
	}

	async fn cleanup_dir(dir: &Path, now: u64) -> Result<usize, StorageError> {
		let mut removed = 0;
		for path in Self::record_files(dir).await? {
			let expired = match fs::read(&path).await {
				Ok(data) => FileHeader::deserialize(&data)
					.map(|header| header.is_expired_at(now))
					.unwrap_or(false),
				Err(e) => {
					tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable record");
					false
				},
			};
			if !expired {
				continue;
			}
			match fs::remove_file(&path).await {
				Ok(()) => removed += 1,
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired record");
				},
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_live(&self.file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key));
		self.write_atomic(&self.file_path(key), value, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(Self::read_live(&self.file_path(key)).await?.is_some())
	}

	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.base_path.join(escape_component(namespace));
		let now = current_timestamp();

		let mut ids = Vec::new();
		for path in Self::record_files(&dir).await? {
			let live = match fs::read(&path).await {
				Ok(data) => FileHeader::deserialize(&data)
					.map(|header| !header.is_expired_at(now))
					.unwrap_or(false),
				Err(_) => false,
			};
			if let (true, Some(stem)) = (live, path.file_stem().and_then(|s| s.to_str())) {
				ids.push(unescape_component(stem));
			}
		}
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = current_timestamp();
		let mut removed = 0;
		for collection in Collection::all() {
			removed += Self::cleanup_dir(&self.base_path.join(collection.as_str()), now).await?;
		}
		Ok(removed)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut fields = vec![Field::optional("storage_path", FieldType::String)];
		for collection in Collection::all() {
			fields.push(Field::optional(
				format!("ttl_{}", collection.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(fields).validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration:
/// - `storage_path`: base directory (default `./data/storage`)
/// - `ttl_<collection>`: default TTL in seconds for that collection (default 0, none)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
