//! The signed-in customer's own orders.

use super::{Refresh, ViewError};
use crate::engine::context::{AppContext, SessionState};
use crate::handlers::{OrderHandler, OrderScope, PrescriptionUpload};
use crate::projection::order_row;
use async_trait::async_trait;
use pharmacy_types::{Order, OrderRow};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct CustomerState {
	orders: Vec<Order>,
	generation: u64,
}

pub struct CustomerOrders {
	context: Arc<AppContext>,
	orders: Arc<OrderHandler>,
	state: RwLock<CustomerState>,
}

impl CustomerOrders {
	pub fn new(context: Arc<AppContext>, orders: Arc<OrderHandler>) -> Self {
		Self {
			context,
			orders,
			state: RwLock::new(CustomerState::default()),
		}
	}

	pub async fn rows(&self) -> Vec<OrderRow> {
		let state = self.state.read().await;
		if state.generation != self.context.generation() {
			return Vec::new();
		}
		state.orders.iter().map(|order| order_row(order, false)).collect()
	}

	/// Submits a new order and reloads the list.
	pub async fn submit(
		&self,
		upload: Option<PrescriptionUpload>,
		notes: Option<String>,
		delivery_address: Option<String>,
	) -> Result<Order, ViewError> {
		let SessionState::SignedIn(session) = self.context.current() else {
			return Err(ViewError::NotSignedIn);
		};

		let order = self
			.orders
			.create_order(&session, upload, notes, delivery_address)
			.await?;

		if let Err(e) = self.refresh().await {
			tracing::warn!(error = %e, "Order list reload after submit failed");
		}
		Ok(order)
	}
}

#[async_trait]
impl Refresh for CustomerOrders {
	fn name(&self) -> &'static str {
		"customer_orders"
	}

	async fn refresh(&self) -> Result<(), ViewError> {
		let generation = self.context.generation();
		let orders = match self.context.current() {
			SessionState::SignedIn(session) => self
				.orders
				.list_orders(&OrderScope::Owner(session.user_id))
				.await
				.map_err(|e| ViewError::Load(e.to_string()))?,
			SessionState::SignedOut => Vec::new(),
		};

		*self.state.write().await = CustomerState { orders, generation };
		Ok(())
	}
}
