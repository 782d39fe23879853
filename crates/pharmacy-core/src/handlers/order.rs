//! Order operations: submission with prescription upload, scoped listing,
//! visibility-checked reads, staff actions and prescription links.

use crate::engine::event_bus::EventBus;
use crate::state::{available_actions, OrderStateError, OrderStateMachine};
use pharmacy_config::MediaConfig;
use pharmacy_media::{MediaService, SignedUrl};
use pharmacy_storage::{Filter, OrderBy, StorageService};
use pharmacy_types::{
	truncate_id, Collection, Order, OrderEvent, OrderStatus, PharmacyEvent, Session, StaffAction,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Forbidden: {0}")]
	Forbidden(String),
	#[error("Action '{action}' is not available for an order in status '{status}'")]
	ActionNotAvailable {
		action: StaffAction,
		status: OrderStatus,
	},
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Invalid upload: {0}")]
	InvalidUpload(String),
	#[error("Upload of {size} bytes exceeds the {max} byte limit")]
	UploadTooLarge { size: usize, max: usize },
	#[error("Upload failed: {0}")]
	Upload(String),
	#[error("Media error: {0}")]
	Media(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStateError> for OrderError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => OrderError::NotFound(id),
			OrderStateError::InvalidTransition { from, to } => {
				OrderError::InvalidTransition { from, to }
			},
			OrderStateError::Storage(e) => OrderError::Storage(e),
		}
	}
}

/// A prescription file supplied with a new order.
#[derive(Debug, Clone)]
pub struct PrescriptionUpload {
	pub file_name: String,
	pub content_type: String,
	pub bytes: Vec<u8>,
}

/// Whose orders a listing covers.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderScope {
	/// Every order.
	Staff,
	/// Orders owned by one customer.
	Owner(String),
}

/// Media settings the order handler needs.
#[derive(Debug, Clone)]
pub struct OrderSettings {
	pub bucket: String,
	pub signed_url_ttl: Duration,
	pub max_upload_bytes: usize,
}

impl From<&MediaConfig> for OrderSettings {
	fn from(config: &MediaConfig) -> Self {
		Self {
			bucket: config.bucket.clone(),
			signed_url_ttl: Duration::from_secs(config.signed_url_ttl_seconds),
			max_upload_bytes: config.max_upload_bytes,
		}
	}
}

/// Object key for an uploaded prescription:
/// `prescription-{unix_millis}-{file name}` with whitespace and any other
/// character unsafe in a URL path replaced by `_`.
pub fn prescription_key(file_name: &str, unix_millis: i64) -> String {
	let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
	let mut name: String = base
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
				c
			} else {
				'_'
			}
		})
		.collect();
	if name.is_empty() {
		name.push_str("upload");
	}
	format!("prescription-{}-{}", unix_millis, name)
}

fn is_accepted_content_type(content_type: &str) -> bool {
	let essence = content_type
		.split(';')
		.next()
		.unwrap_or("")
		.trim()
		.to_ascii_lowercase();
	essence.starts_with("image/") || essence == "application/pdf"
}

pub struct OrderHandler {
	storage: Arc<StorageService>,
	media: Arc<MediaService>,
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	settings: OrderSettings,
}

impl OrderHandler {
	pub fn new(
		storage: Arc<StorageService>,
		media: Arc<MediaService>,
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		settings: OrderSettings,
	) -> Self {
		Self {
			storage,
			media,
			state_machine,
			event_bus,
			settings,
		}
	}

	pub fn settings(&self) -> &OrderSettings {
		&self.settings
	}

	/// Submits a new pending order for the signed-in customer.
	///
	/// The prescription, if any, is uploaded first. When the upload fails
	/// no order is recorded.
	#[instrument(skip_all, fields(user_id = %truncate_id(&session.user_id)))]
	pub async fn create_order(
		&self,
		session: &Session,
		upload: Option<PrescriptionUpload>,
		notes: Option<String>,
		delivery_address: Option<String>,
	) -> Result<Order, OrderError> {
		let prescription_ref = match upload {
			Some(upload) => Some(self.upload_prescription(upload).await?),
			None => None,
		};

		let order = Order::new(&session.user_id, prescription_ref, notes, delivery_address);
		if let Err(e) = self.state_machine.store_order(&order).await {
			if let Some(key) = &order.prescription_ref {
				tracing::warn!(
					bucket = %self.settings.bucket,
					key = %key,
					error = %e,
					"Order not stored, prescription left without an order"
				);
			}
			return Err(e.into());
		}

		tracing::info!(
			order_id = %truncate_id(&order.id),
			has_prescription = order.has_prescription(),
			"Order submitted"
		);
		self.event_bus
			.publish(PharmacyEvent::Order(OrderEvent::Created {
				order_id: order.id.clone(),
				owner_id: order.owner_id.clone(),
			}))
			.ok();

		Ok(order)
	}

	async fn upload_prescription(&self, upload: PrescriptionUpload) -> Result<String, OrderError> {
		if upload.bytes.is_empty() {
			return Err(OrderError::InvalidUpload("file is empty".into()));
		}
		if upload.bytes.len() > self.settings.max_upload_bytes {
			return Err(OrderError::UploadTooLarge {
				size: upload.bytes.len(),
				max: self.settings.max_upload_bytes,
			});
		}
		if !is_accepted_content_type(&upload.content_type) {
			return Err(OrderError::InvalidUpload(format!(
				"unsupported content type '{}', expected an image or PDF",
				upload.content_type
			)));
		}

		let key = prescription_key(&upload.file_name, chrono::Utc::now().timestamp_millis());
		self.media
			.upload(&self.settings.bucket, &key, upload.bytes, &upload.content_type)
			.await
			.map_err(|e| {
				tracing::warn!(key = %key, error = %e, "Prescription upload failed");
				OrderError::Upload(e.to_string())
			})
	}

	/// Lists orders newest first.
	pub async fn list_orders(&self, scope: &OrderScope) -> Result<Vec<Order>, OrderError> {
		let filter = match scope {
			OrderScope::Staff => None,
			OrderScope::Owner(user_id) => Some(Filter::eq("owner_id", user_id.as_str())),
		};

		self.storage
			.list(
				Collection::Orders,
				filter.as_ref(),
				Some(&OrderBy::desc("created_at")),
			)
			.await
			.map_err(|e| OrderError::Storage(e.to_string()))
	}

	/// Reads one order. Orders owned by someone else look missing to customers.
	pub async fn get_order(&self, session: &Session, order_id: &str) -> Result<Order, OrderError> {
		let order = self.state_machine.get_order(order_id).await?;
		if session.is_staff() || order.owner_id == session.user_id {
			Ok(order)
		} else {
			Err(OrderError::NotFound(order_id.to_string()))
		}
	}

	/// Applies a staff action after checking the gate against the stored status.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), action = %action))]
	pub async fn apply_staff_action(
		&self,
		session: &Session,
		order_id: &str,
		action: StaffAction,
	) -> Result<Order, OrderError> {
		if !session.is_staff() {
			return Err(OrderError::Forbidden("staff role required".into()));
		}

		let current = self.state_machine.get_order(order_id).await?;
		if !available_actions(&current.status).contains(action) {
			return Err(OrderError::ActionNotAvailable {
				action,
				status: current.status,
			});
		}

		let updated = self
			.state_machine
			.transition_order_status(order_id, action.target())
			.await?;

		tracing::info!(from = %current.status, to = %updated.status, "Order status changed");
		self.event_bus
			.publish(PharmacyEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				from: current.status,
				to: updated.status.clone(),
			}))
			.ok();

		Ok(updated)
	}

	/// Signed link to an order's prescription, or `None` if none is attached.
	pub async fn prescription_link(
		&self,
		session: &Session,
		order_id: &str,
	) -> Result<Option<SignedUrl>, OrderError> {
		let order = self.get_order(session, order_id).await?;
		let Some(key) = order.prescription_ref.filter(|r| !r.is_empty()) else {
			return Ok(None);
		};

		self.media
			.create_signed_url(&self.settings.bucket, &key, self.settings.signed_url_ttl)
			.map(Some)
			.map_err(|e| OrderError::Media(e.to_string()))
	}
}
