//! Order status state machine.
//!
//! Orders advance `pending -> accepted -> ready -> delivered` and may leave
//! to `rejected` from any non-terminal state. `delivered` and `rejected` are
//! terminal. A stored status this build does not recognise admits no
//! transition at all.

use chrono::Utc;
use once_cell::sync::Lazy;
use pharmacy_storage::{StorageError, StorageService};
use pharmacy_types::{Collection, Order, OrderStatus};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

/// Allowed next states for each known status.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Pending,
		HashSet::from([OrderStatus::Accepted, OrderStatus::Rejected]),
	);
	m.insert(
		OrderStatus::Accepted,
		HashSet::from([OrderStatus::Ready, OrderStatus::Rejected]),
	);
	m.insert(
		OrderStatus::Ready,
		HashSet::from([OrderStatus::Delivered, OrderStatus::Rejected]),
	);
	m.insert(OrderStatus::Delivered, HashSet::new()); // terminal
	m.insert(OrderStatus::Rejected, HashSet::new()); // terminal
	m
});

/// Whether no further transition is possible from `status` by design.
pub fn is_terminal(status: &OrderStatus) -> bool {
	matches!(status, OrderStatus::Delivered | OrderStatus::Rejected)
}

pub fn can_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
	TRANSITIONS
		.get(from)
		.is_some_and(|allowed| allowed.contains(to))
}

/// Loads, validates and persists order status changes.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(Collection::Orders, order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::Storage(other.to_string()),
			})
	}

	/// Inserts a new order. Never overwrites an existing one.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.insert(Collection::Orders, &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Moves an order to `new_status`, validated against its stored status.
	///
	/// Only `status` and `updated_at` are written; every other field keeps
	/// its stored value.
	pub async fn transition_order_status(
		&self,
		order_id: &str,
		new_status: OrderStatus,
	) -> Result<Order, OrderStateError> {
		let mut order = self.get_order(order_id).await?;

		if !can_transition(&order.status, &new_status) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: new_status,
			});
		}

		let now = Utc::now();
		self.storage
			.update(
				Collection::Orders,
				order_id,
				json!({ "status": new_status.as_str(), "updated_at": now }),
			)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::Storage(other.to_string()),
			})?;

		order.status = new_status;
		order.updated_at = Some(now);
		Ok(order)
	}
}
