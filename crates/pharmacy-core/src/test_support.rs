//! Shared fixtures for unit tests.

use crate::engine::context::AppContext;
use crate::engine::event_bus::EventBus;
use crate::handlers::{OrderHandler, OrderSettings};
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pharmacy_auth::implementations::local::LocalAuth;
use pharmacy_auth::AuthService;
use pharmacy_media::implementations::memory::MemoryMedia;
use pharmacy_media::{MediaError, MediaInterface, MediaObject, MediaService};
use pharmacy_storage::implementations::memory::MemoryStorage;
use pharmacy_storage::{StorageError, StorageInterface, StorageService};
use pharmacy_types::{ConfigSchema, Role, SecretString, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STAFF_EMAIL: &str = "staff@pharmacy.test";

pub fn customer_session(user_id: &str) -> Session {
	session(user_id, &format!("{}@example.com", user_id), Role::Customer)
}

pub fn staff_session() -> Session {
	session("staff-1", STAFF_EMAIL, Role::Staff)
}

fn session(user_id: &str, email: &str, role: Role) -> Session {
	let now = Utc::now();
	Session {
		token: format!("token-{}", user_id),
		user_id: user_id.to_string(),
		email: email.to_string(),
		role,
		created_at: now,
		expires_at: now + ChronoDuration::hours(1),
	}
}

mockall::mock! {
	pub Media {}

	#[async_trait]
	impl MediaInterface for Media {
		fn config_schema(&self) -> Box<dyn ConfigSchema>;
		async fn upload(
			&self,
			bucket: &str,
			key: &str,
			bytes: Vec<u8>,
			content_type: &str,
		) -> Result<String, MediaError>;
		async fn download(&self, bucket: &str, key: &str) -> Result<MediaObject, MediaError>;
	}
}

/// Switches shared with a [`FlakyStorage`] to make it fail on demand.
#[derive(Clone, Default)]
pub struct FailureSwitch {
	reads: Arc<AtomicBool>,
	writes: Arc<AtomicBool>,
}

impl FailureSwitch {
	pub fn fail_reads(&self, fail: bool) {
		self.reads.store(fail, Ordering::SeqCst);
	}

	pub fn fail_writes(&self, fail: bool) {
		self.writes.store(fail, Ordering::SeqCst);
	}

	fn check_read(&self) -> Result<(), StorageError> {
		if self.reads.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("injected read failure".into()));
		}
		Ok(())
	}

	fn check_write(&self) -> Result<(), StorageError> {
		if self.writes.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("injected write failure".into()));
		}
		Ok(())
	}
}

/// In-memory storage whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
	inner: MemoryStorage,
	switch: FailureSwitch,
}

impl FlakyStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn failure_switch(&self) -> FailureSwitch {
		self.switch.clone()
	}
}

#[async_trait]
impl StorageInterface for FlakyStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.switch.check_read()?;
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.switch.check_write()?;
		self.inner.set_bytes(key, value, ttl).await
	}

	async fn insert_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		self.switch.check_write()?;
		self.inner.insert_bytes(key, value, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.switch.check_write()?;
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.switch.check_read()?;
		self.inner.exists(key).await
	}

	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		self.switch.check_read()?;
		self.inner.list_ids(namespace).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

/// Services wired together over in-memory backends.
pub struct Harness {
	pub storage: Arc<StorageService>,
	pub auth: Arc<AuthService>,
	pub media: Arc<MediaService>,
	pub event_bus: EventBus,
	pub state_machine: Arc<OrderStateMachine>,
	pub orders: Arc<OrderHandler>,
	failures: Option<FailureSwitch>,
}

impl Harness {
	pub fn new() -> Self {
		Self::build(Box::new(MemoryStorage::new()), memory_media(), None)
	}

	pub fn with_media(media: MediaService) -> Self {
		Self::build(Box::new(MemoryStorage::new()), media, None)
	}

	pub fn with_flaky_storage() -> Self {
		let storage = FlakyStorage::new();
		let failures = storage.failure_switch();
		Self::build(Box::new(storage), memory_media(), Some(failures))
	}

	fn build(
		storage: Box<dyn StorageInterface>,
		media: MediaService,
		failures: Option<FailureSwitch>,
	) -> Self {
		let storage = Arc::new(StorageService::new(storage));
		let auth = Arc::new(AuthService::new(Box::new(LocalAuth::new(
			storage.clone(),
			Duration::from_secs(3600),
			6,
			vec![STAFF_EMAIL.to_string()],
		))));
		let media = Arc::new(media);
		let event_bus = EventBus::new(64);
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let orders = Arc::new(OrderHandler::new(
			storage.clone(),
			media.clone(),
			state_machine.clone(),
			event_bus.clone(),
			OrderSettings {
				bucket: "prescriptions".to_string(),
				signed_url_ttl: Duration::from_secs(60),
				max_upload_bytes: 1024 * 1024,
			},
		));

		Self {
			storage,
			auth,
			media,
			event_bus,
			state_machine,
			orders,
			failures,
		}
	}

	pub fn context(&self) -> AppContext {
		AppContext::new(self.auth.clone(), self.event_bus.clone())
	}

	pub fn storage_failures(&self) -> &FailureSwitch {
		self.failures
			.as_ref()
			.expect("harness built without flaky storage")
	}
}

fn memory_media() -> MediaService {
	MediaService::new(
		Box::new(MemoryMedia::new()),
		SecretString::from("test-signing-secret-0123456789"),
		"http://localhost:3000",
	)
}
