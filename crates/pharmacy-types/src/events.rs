//! Events published on the engine's event bus.
//!
//! Consumers such as the event-driven revalidation scheduler subscribe to
//! these to pick up changes without polling.

use crate::OrderStatus;
use serde::{Deserialize, Serialize};

/// Top-level event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PharmacyEvent {
	/// Events about orders.
	Order(OrderEvent),
	/// Events about sessions.
	Auth(AuthEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A customer submitted a new order.
	Created { order_id: String, owner_id: String },
	/// Staff moved an order to a new status.
	StatusChanged {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthEvent {
	SignedIn { user_id: String },
	SignedOut { user_id: String },
}
