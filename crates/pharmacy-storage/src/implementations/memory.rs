//! In-memory storage backend.
//!
//! Nothing survives a restart. Entries honour their TTL: an expired entry is
//! invisible to reads immediately and is dropped by `cleanup_expired`.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use pharmacy_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl
				.filter(|ttl| !ttl.is_zero())
				.map(|ttl| Instant::now() + ttl),
		}
	}

	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// HashMap-backed storage behind a read-write lock.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store
			.get(key)
			.filter(|entry| entry.is_live(Instant::now()))
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn insert_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		if store.get(key).is_some_and(|entry| entry.is_live(Instant::now())) {
			return Ok(false);
		}
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| entry.is_live(Instant::now())))
	}

	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		let now = Instant::now();
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(_, entry)| entry.is_live(now))
			.filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| entry.is_live(now));
		Ok(before - store.len())
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![]).validate(config)
	}
}

/// Creates a memory storage backend. Takes no configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage
			.set_bytes("orders:1", b"value".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"value");
		assert!(storage.exists("orders:1").await.unwrap());

		storage.delete("orders:1").await.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_insert_only_when_absent() {
		let storage = MemoryStorage::new();
		assert!(storage
			.insert_bytes("users:a", b"first".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.insert_bytes("users:a", b"second".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("users:a").await.unwrap(), b"first");
	}

	#[tokio::test]
	async fn test_ttl_expiry_and_cleanup() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("sessions:t", b"s".to_vec(), Some(Duration::from_millis(20)))
			.await
			.unwrap();
		storage
			.set_bytes("sessions:keep", b"k".to_vec(), None)
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(40)).await;

		assert!(!storage.exists("sessions:t").await.unwrap());
		assert_eq!(storage.list_ids("sessions").await.unwrap(), vec!["keep"]);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_list_ids_by_namespace() {
		let storage = MemoryStorage::new();
		for key in ["orders:a", "orders:b", "products:x"] {
			storage.set_bytes(key, vec![1], None).await.unwrap();
		}

		let mut ids = storage.list_ids("orders").await.unwrap();
		ids.sort();
		assert_eq!(ids, vec!["a", "b"]);
	}

	#[test]
	fn test_rejects_unknown_config() {
		let config: toml::Value = toml::from_str("storage_path = \"x\"").unwrap();
		assert!(create_storage(&config).is_err());
	}
}
