//! Record store for the pharmacy delivery service.
//!
//! Backends implement a small key/value interface ([`StorageInterface`]);
//! [`StorageService`] layers the record operations the application needs
//! on top of it: typed `list` with an equality filter and ordering,
//! `insert` that refuses to overwrite, and `update` that merges a JSON patch
//! into the stored record.
//!
//! Keys have the form `<collection>:<id>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pharmacy_types::{Collection, ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface implemented by every storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores bytes, replacing any previous value. `ttl` overrides the
	/// backend's configured default for the key's collection.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Stores bytes only if the key is absent. Returns whether it was stored.
	///
	/// Backends that can do this atomically should override the default.
	async fn insert_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		if self.exists(key).await? {
			return Ok(false);
		}
		self.set_bytes(key, value, ttl).await?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists the ids of live entries stored under `namespace`.
	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries, returning how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All built-in backends as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Equality filter on a top-level record field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	pub field: String,
	pub value: Value,
}

impl Filter {
	pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self {
			field: field.into(),
			value: value.into(),
		}
	}

	fn matches(&self, record: &Value) -> bool {
		record.get(&self.field) == Some(&self.value)
	}
}

/// Sort order on a top-level record field.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
	pub field: String,
	pub ascending: bool,
}

impl OrderBy {
	pub fn asc(field: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			ascending: true,
		}
	}

	pub fn desc(field: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			ascending: false,
		}
	}

	fn compare(&self, a: &Value, b: &Value) -> Ordering {
		let ordering = compare_values(a.get(&self.field), b.get(&self.field));
		if self.ascending {
			ordering
		} else {
			ordering.reverse()
		}
	}
}

/// Orders field values: missing first, then numbers, RFC 3339 timestamps
/// chronologically, other strings lexically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	match (a, b) {
		(None, None) => Ordering::Equal,
		(None, Some(_)) => Ordering::Less,
		(Some(_), None) => Ordering::Greater,
		(Some(Value::Number(x)), Some(Value::Number(y))) => x
			.as_f64()
			.partial_cmp(&y.as_f64())
			.unwrap_or(Ordering::Equal),
		(Some(Value::String(x)), Some(Value::String(y))) => {
			match (
				x.parse::<DateTime<Utc>>(),
				y.parse::<DateTime<Utc>>(),
			) {
				(Ok(dx), Ok(dy)) => dx.cmp(&dy),
				_ => x.cmp(y),
			}
		},
		(Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
		_ => Ordering::Equal,
	}
}

/// Typed record operations over a storage backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn record_key(collection: Collection, id: &str) -> String {
	format!("{}:{}", collection.as_str(), id)
}

fn to_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a record, replacing any existing one, with an optional TTL.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		collection: Collection,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&record_key(collection, id), to_bytes(data)?, ttl)
			.await
	}

	pub async fn store<T: Serialize>(
		&self,
		collection: Collection,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(collection, id, data, None).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		collection: Collection,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&record_key(collection, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	pub async fn exists(&self, collection: Collection, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&record_key(collection, id)).await
	}

	pub async fn remove(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&record_key(collection, id)).await
	}

	/// Inserts a new record. Fails with `AlreadyExists` instead of overwriting.
	pub async fn insert<T: Serialize>(
		&self,
		collection: Collection,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.insert_with_ttl(collection, id, data, None).await
	}

	pub async fn insert_with_ttl<T: Serialize>(
		&self,
		collection: Collection,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = record_key(collection, id);
		if self.backend.insert_bytes(&key, to_bytes(data)?, ttl).await? {
			Ok(())
		} else {
			Err(StorageError::AlreadyExists(key))
		}
	}

	/// Merges the fields of `patch` into an existing record.
	///
	/// Only top-level fields are replaced; fields absent from the patch keep
	/// their stored value. Fails with `NotFound` if the record is missing.
	pub async fn update(
		&self,
		collection: Collection,
		id: &str,
		patch: Value,
	) -> Result<(), StorageError> {
		let Value::Object(fields) = patch else {
			return Err(StorageError::Serialization(
				"Patch must be a JSON object".into(),
			));
		};

		let key = record_key(collection, id);
		let bytes = self.backend.get_bytes(&key).await?;
		let mut record: Value = serde_json::from_slice(&bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		let Some(target) = record.as_object_mut() else {
			return Err(StorageError::Serialization(format!(
				"Stored record {} is not an object",
				key
			)));
		};
		for (field, value) in fields {
			target.insert(field, value);
		}

		self.backend.set_bytes(&key, to_bytes(&record)?, None).await
	}

	/// Lists records of a collection, optionally filtered and sorted.
	///
	/// Records that fail to decode are skipped with a warning so that one bad
	/// entry does not hide the rest of the collection.
	pub async fn list<T: DeserializeOwned>(
		&self,
		collection: Collection,
		filter: Option<&Filter>,
		order_by: Option<&OrderBy>,
	) -> Result<Vec<T>, StorageError> {
		let ids = self.backend.list_ids(collection.as_str()).await?;

		let mut records = Vec::with_capacity(ids.len());
		for id in ids {
			let bytes = match self.backend.get_bytes(&record_key(collection, &id)).await {
				Ok(bytes) => bytes,
				// Expired or removed between listing and reading.
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			match serde_json::from_slice::<Value>(&bytes) {
				Ok(record) if filter.is_none_or(|f| f.matches(&record)) => records.push((id, record)),
				Ok(_) => {},
				Err(e) => {
					tracing::warn!(collection = %collection, id = %id, error = %e, "Skipping undecodable record");
				},
			}
		}

		if let Some(order_by) = order_by {
			records.sort_by(|(_, a), (_, b)| order_by.compare(a, b));
		}

		Ok(records
			.into_iter()
			.filter_map(|(id, record)| match serde_json::from_value(record) {
				Ok(item) => Some(item),
				Err(e) => {
					tracing::warn!(collection = %collection, id = %id, error = %e, "Skipping malformed record");
					None
				},
			})
			.collect())
	}

	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
