//! The pharmacy engine: the assembled services plus background upkeep.
//!
//! The engine owns the storage, auth and media services, the order and
//! catalog handlers built on them, and the event bus connecting everything.
//! Transports such as the HTTP API borrow the handlers from it.

pub mod context;
pub mod event_bus;
pub mod lifecycle;

use crate::handlers::{CatalogService, OrderHandler, OrderSettings};
use crate::state::OrderStateMachine;
use context::AppContext;
use pharmacy_auth::AuthService;
use pharmacy_config::Config;
use pharmacy_media::MediaService;
use pharmacy_storage::StorageService;
use pharmacy_types::{AuthEvent, OrderEvent, PharmacyEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

#[derive(Clone)]
pub struct PharmacyEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) auth: Arc<AuthService>,
	pub(crate) media: Arc<MediaService>,
	pub(crate) event_bus: event_bus::EventBus,
	pub(crate) order_handler: Arc<OrderHandler>,
	pub(crate) catalog: Arc<CatalogService>,
}

impl PharmacyEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		auth: Arc<AuthService>,
		media: Arc<MediaService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));

		let order_handler = Arc::new(OrderHandler::new(
			storage.clone(),
			media.clone(),
			state_machine,
			event_bus.clone(),
			OrderSettings::from(&config.media),
		));

		let catalog = Arc::new(CatalogService::new(storage.clone()));

		Self {
			config,
			storage,
			auth,
			media,
			event_bus,
			order_handler,
			catalog,
		}
	}

	/// Runs background tasks until interrupted with Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Runs background tasks until `shutdown` completes.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let mut event_receiver = self.event_bus.subscribe();
		let cleanup_handle = self.spawn_storage_cleanup();
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				event = event_receiver.recv() => match event {
					Ok(event) => log_event(&event),
					Err(RecvError::Lagged(missed)) => {
						tracing::warn!(missed, "Event log lagged behind");
					},
					Err(RecvError::Closed) => break,
				},

				_ = &mut shutdown => break,
			}
		}

		cleanup_handle.abort();
		Ok(())
	}

	/// Periodically removes expired records such as old sessions.
	fn spawn_storage_cleanup(&self) -> JoinHandle<()> {
		let storage = self.storage.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!(removed = count, "Storage cleanup");
					},
					Err(e) => {
						tracing::warn!(error = %e, "Storage cleanup failed");
					},
					_ => {},
				}
			}
		})
	}

	/// A fresh, signed-out session context backed by this engine's auth.
	pub fn new_context(&self) -> AppContext {
		AppContext::new(self.auth.clone(), self.event_bus.clone())
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn auth(&self) -> &Arc<AuthService> {
		&self.auth
	}

	pub fn media(&self) -> &Arc<MediaService> {
		&self.media
	}

	pub fn orders(&self) -> &Arc<OrderHandler> {
		&self.order_handler
	}

	pub fn catalog(&self) -> &Arc<CatalogService> {
		&self.catalog
	}
}

fn log_event(event: &PharmacyEvent) {
	use pharmacy_types::truncate_id;

	match event {
		PharmacyEvent::Order(OrderEvent::Created { order_id, owner_id }) => {
			tracing::info!(order_id = %truncate_id(order_id), owner_id = %truncate_id(owner_id), "Order created");
		},
		PharmacyEvent::Order(OrderEvent::StatusChanged { order_id, from, to }) => {
			tracing::info!(order_id = %truncate_id(order_id), from = %from, to = %to, "Order status changed");
		},
		PharmacyEvent::Auth(AuthEvent::SignedIn { user_id }) => {
			tracing::debug!(user_id = %truncate_id(user_id), "Signed in");
		},
		PharmacyEvent::Auth(AuthEvent::SignedOut { user_id }) => {
			tracing::debug!(user_id = %truncate_id(user_id), "Signed out");
		},
	}
}

#[cfg(test)]
mod tests {
	use crate::builder::{PharmacyBuilder, PharmacyFactories};
	use pharmacy_config::builders::ConfigBuilder;
	use pharmacy_config::ProductSeed;
	use pharmacy_types::{OrderEvent, PharmacyEvent};
	use rust_decimal::Decimal;
	use std::str::FromStr;
	use tokio::sync::oneshot;

	fn engine_with_products(products: Vec<ProductSeed>) -> super::PharmacyEngine {
		let mut builder = ConfigBuilder::new();
		for product in products {
			builder = builder.product(product);
		}
		let factories = PharmacyFactories {
			storage_factories: pharmacy_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			auth_factories: pharmacy_auth::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			media_factories: pharmacy_media::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		PharmacyBuilder::new(builder.build()).build(factories).unwrap()
	}

	#[tokio::test]
	async fn test_initialize_seeds_catalog() {
		let engine = engine_with_products(vec![ProductSeed {
			id: "p1".into(),
			name: "Ibuprofen 400mg".into(),
			description: String::new(),
			price: Decimal::from_str("5.10").unwrap(),
			image_ref: None,
			requires_prescription: false,
		}]);

		engine.initialize().await.unwrap();
		engine.initialize().await.unwrap();

		let products = engine.catalog().list_products().await;
		assert_eq!(products.len(), 1);
		assert_eq!(products[0].name, "Ibuprofen 400mg");
	}

	#[tokio::test]
	async fn test_run_until_stops_on_signal() {
		let engine = engine_with_products(Vec::new());
		let (stop, stopped) = oneshot::channel::<()>();

		let runner = engine.clone();
		let task = tokio::spawn(async move {
			runner
				.run_until(async {
					stopped.await.ok();
				})
				.await
		});

		tokio::task::yield_now().await;
		engine
			.event_bus()
			.publish(PharmacyEvent::Order(OrderEvent::Created {
				order_id: "order-1".into(),
				owner_id: "user-1".into(),
			}))
			.ok();
		stop.send(()).unwrap();

		task.await.unwrap().unwrap();
	}
}
