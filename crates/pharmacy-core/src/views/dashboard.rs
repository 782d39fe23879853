//! Staff dashboard: every order, with the actions staff may take on each.
//!
//! Staff actions are applied in two phases. [`StaffDashboard::begin_action`]
//! shows the requested status immediately and returns a [`PendingUpdate`];
//! [`StaffDashboard::commit`] writes it through the store. If the write
//! fails, the optimistic status is discarded and the whole list is reloaded
//! from the store.

use super::{Refresh, ViewError};
use crate::engine::context::{AppContext, SessionState};
use crate::handlers::{OrderHandler, OrderScope};
use crate::projection::order_row;
use crate::state::available_actions;
use async_trait::async_trait;
use pharmacy_types::{truncate_id, Order, OrderRow, OrderStatus, Session, StaffAction};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum DashboardError {
	#[error(transparent)]
	View(#[from] ViewError),
	#[error("Order {0} is not on the dashboard")]
	UnknownOrder(String),
	#[error("Action '{action}' is not available for an order in status '{status}'")]
	ActionNotAvailable {
		action: StaffAction,
		status: OrderStatus,
	},
	/// The status write failed; the dashboard was rolled back and reloaded.
	#[error("Status update failed: {0}")]
	UpdateFailed(String),
}

/// An optimistic status change shown on the dashboard but not yet stored.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pending update must be committed"]
pub struct PendingUpdate {
	pub order_id: String,
	pub action: StaffAction,
	/// Last confirmed status.
	pub previous: OrderStatus,
	/// Status displayed while the write is in flight.
	pub optimistic: OrderStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
	/// The store accepted the change.
	Confirmed(Order),
	/// The store refused the change. `reloaded` tells whether the list was
	/// re-fetched afterwards.
	RolledBack { error: String, reloaded: bool },
}

#[derive(Debug, Default)]
struct DashboardState {
	orders: Vec<Order>,
	/// Session generation the orders were loaded under.
	generation: u64,
}

pub struct StaffDashboard {
	context: Arc<AppContext>,
	orders: Arc<OrderHandler>,
	state: RwLock<DashboardState>,
}

impl StaffDashboard {
	pub fn new(context: Arc<AppContext>, orders: Arc<OrderHandler>) -> Self {
		Self {
			context,
			orders,
			state: RwLock::new(DashboardState::default()),
		}
	}

	fn staff_session(&self) -> Result<Session, ViewError> {
		match self.context.current() {
			SessionState::SignedIn(session) if session.is_staff() => Ok(session),
			SessionState::SignedIn(_) => Err(ViewError::NotStaff),
			SessionState::SignedOut => Err(ViewError::NotSignedIn),
		}
	}

	/// Current rows, newest first. Empty when loaded under another session.
	pub async fn rows(&self) -> Vec<OrderRow> {
		let state = self.state.read().await;
		if state.generation != self.context.generation() {
			return Vec::new();
		}
		state.orders.iter().map(|order| order_row(order, true)).collect()
	}

	/// The status currently displayed for an order.
	pub async fn displayed_status(&self, order_id: &str) -> Option<OrderStatus> {
		let state = self.state.read().await;
		state
			.orders
			.iter()
			.find(|order| order.id == order_id)
			.map(|order| order.status.clone())
	}

	/// Shows the action's target status right away.
	pub async fn begin_action(
		&self,
		order_id: &str,
		action: StaffAction,
	) -> Result<PendingUpdate, DashboardError> {
		self.staff_session()?;

		let mut state = self.state.write().await;
		let order = state
			.orders
			.iter_mut()
			.find(|order| order.id == order_id)
			.ok_or_else(|| DashboardError::UnknownOrder(order_id.to_string()))?;

		if !available_actions(&order.status).contains(action) {
			return Err(DashboardError::ActionNotAvailable {
				action,
				status: order.status.clone(),
			});
		}

		let pending = PendingUpdate {
			order_id: order_id.to_string(),
			action,
			previous: order.status.clone(),
			optimistic: action.target(),
		};
		order.status = pending.optimistic.clone();
		Ok(pending)
	}

	/// Writes a pending update through the store.
	pub async fn commit(&self, pending: PendingUpdate) -> UpdateOutcome {
		let result = match self.staff_session() {
			Ok(session) => self
				.orders
				.apply_staff_action(&session, &pending.order_id, pending.action)
				.await
				.map_err(|e| e.to_string()),
			Err(e) => Err(e.to_string()),
		};

		match result {
			Ok(order) => {
				let mut state = self.state.write().await;
				if let Some(row) = state.orders.iter_mut().find(|o| o.id == order.id) {
					*row = order.clone();
				}
				UpdateOutcome::Confirmed(order)
			},
			Err(error) => {
				tracing::warn!(
					order_id = %truncate_id(&pending.order_id),
					action = %pending.action,
					error = %error,
					"Status update failed, reloading dashboard"
				);
				self.discard(&pending).await;
				let reloaded = match self.refresh().await {
					Ok(()) => true,
					Err(e) => {
						tracing::warn!(error = %e, "Dashboard reload failed");
						false
					},
				};
				UpdateOutcome::RolledBack { error, reloaded }
			},
		}
	}

	/// Restores the confirmed status unless something newer replaced it.
	async fn discard(&self, pending: &PendingUpdate) {
		let mut state = self.state.write().await;
		if let Some(order) = state
			.orders
			.iter_mut()
			.find(|o| o.id == pending.order_id && o.status == pending.optimistic)
		{
			order.status = pending.previous.clone();
		}
	}

	/// Begins and commits an action in one call.
	pub async fn apply_action(
		&self,
		order_id: &str,
		action: StaffAction,
	) -> Result<Order, DashboardError> {
		let pending = self.begin_action(order_id, action).await?;
		match self.commit(pending).await {
			UpdateOutcome::Confirmed(order) => Ok(order),
			UpdateOutcome::RolledBack { error, .. } => Err(DashboardError::UpdateFailed(error)),
		}
	}
}

#[async_trait]
impl Refresh for StaffDashboard {
	fn name(&self) -> &'static str {
		"staff_dashboard"
	}

	async fn refresh(&self) -> Result<(), ViewError> {
		let generation = self.context.generation();
		let session = match self.staff_session() {
			Ok(session) => session,
			Err(e) => {
				*self.state.write().await = DashboardState {
					orders: Vec::new(),
					generation,
				};
				return match e {
					ViewError::NotSignedIn => Ok(()),
					other => Err(other),
				};
			},
		};

		let orders = self
			.orders
			.list_orders(&OrderScope::Staff)
			.await
			.map_err(|e| ViewError::Load(e.to_string()))?;

		tracing::debug!(user_id = %truncate_id(&session.user_id), count = orders.len(), "Dashboard reloaded");
		*self.state.write().await = DashboardState { orders, generation };
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{customer_session, Harness, STAFF_EMAIL};
	use pharmacy_types::SecretString;

	async fn signed_in_dashboard(harness: &Harness) -> (Arc<AppContext>, StaffDashboard) {
		let context = Arc::new(harness.context());
		let password = SecretString::from("staff-password");
		context.sign_up(STAFF_EMAIL, &password).await.unwrap();
		context.sign_in(STAFF_EMAIL, &password).await.unwrap();
		let dashboard = StaffDashboard::new(context.clone(), harness.orders.clone());
		(context, dashboard)
	}

	#[tokio::test]
	async fn test_accept_then_call_rider_enabled() {
		let harness = Harness::new();
		let order = harness
			.orders
			.create_order(&customer_session("alice"), None, None, None)
			.await
			.unwrap();
		let (_context, dashboard) = signed_in_dashboard(&harness).await;
		dashboard.refresh().await.unwrap();

		let confirmed = dashboard.apply_action(&order.id, StaffAction::Accept).await.unwrap();
		assert_eq!(confirmed.status, OrderStatus::Accepted);

		let rows = dashboard.rows().await;
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].status, "accepted");
		let actions = rows[0].actions.as_ref().unwrap();
		assert!(actions.contains(StaffAction::CallRider));
		assert!(!actions.contains(StaffAction::Accept));
	}

	#[tokio::test]
	async fn test_optimistic_status_shown_before_commit() {
		let harness = Harness::new();
		let order = harness
			.orders
			.create_order(&customer_session("alice"), None, None, None)
			.await
			.unwrap();
		let (_context, dashboard) = signed_in_dashboard(&harness).await;
		dashboard.refresh().await.unwrap();

		let pending = dashboard.begin_action(&order.id, StaffAction::Accept).await.unwrap();
		assert_eq!(pending.previous, OrderStatus::Pending);
		assert_eq!(
			dashboard.displayed_status(&order.id).await,
			Some(OrderStatus::Accepted)
		);
		// Not stored yet.
		let stored = harness.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Pending);

		assert!(matches!(dashboard.commit(pending).await, UpdateOutcome::Confirmed(_)));
	}

	#[tokio::test]
	async fn test_failed_write_rolls_back_and_reloads() {
		let harness = Harness::with_flaky_storage();
		let order = harness
			.orders
			.create_order(&customer_session("alice"), None, None, None)
			.await
			.unwrap();
		let (_context, dashboard) = signed_in_dashboard(&harness).await;
		dashboard.refresh().await.unwrap();

		harness.storage_failures().fail_writes(true);
		let pending = dashboard.begin_action(&order.id, StaffAction::Accept).await.unwrap();
		match dashboard.commit(pending).await {
			UpdateOutcome::RolledBack { reloaded, .. } => assert!(reloaded),
			other => panic!("expected rollback, got {:?}", other),
		}
		assert_eq!(
			dashboard.displayed_status(&order.id).await,
			Some(OrderStatus::Pending)
		);

		let err = dashboard
			.apply_action(&order.id, StaffAction::Accept)
			.await
			.unwrap_err();
		assert!(matches!(err, DashboardError::UpdateFailed(_)));
		assert_eq!(dashboard.rows().await[0].status, "pending");
	}

	#[tokio::test]
	async fn test_rejected_order_offers_no_actions() {
		let harness = Harness::new();
		let order = harness
			.orders
			.create_order(&customer_session("alice"), None, None, None)
			.await
			.unwrap();
		let (_context, dashboard) = signed_in_dashboard(&harness).await;
		dashboard.refresh().await.unwrap();

		dashboard.apply_action(&order.id, StaffAction::Accept).await.unwrap();
		dashboard.apply_action(&order.id, StaffAction::CallRider).await.unwrap();
		dashboard.apply_action(&order.id, StaffAction::Reject).await.unwrap();

		let rows = dashboard.rows().await;
		assert_eq!(rows[0].badge.label, "Rejected");
		assert!(rows[0].actions.as_ref().unwrap().is_empty());
		assert!(matches!(
			dashboard.begin_action(&order.id, StaffAction::Accept).await,
			Err(DashboardError::ActionNotAvailable { .. })
		));
	}

	#[tokio::test]
	async fn test_sign_out_clears_rows() {
		let harness = Harness::new();
		harness
			.orders
			.create_order(&customer_session("alice"), None, None, None)
			.await
			.unwrap();
		let (context, dashboard) = signed_in_dashboard(&harness).await;
		dashboard.refresh().await.unwrap();
		assert_eq!(dashboard.rows().await.len(), 1);

		context.sign_out().await;
		assert!(dashboard.rows().await.is_empty());
		dashboard.refresh().await.unwrap();
		assert!(dashboard.rows().await.is_empty());
	}

	#[tokio::test]
	async fn test_customer_cannot_load_dashboard() {
		let harness = Harness::new();
		let context = Arc::new(harness.context());
		let password = SecretString::from("secret-pw");
		context.sign_up("alice@example.com", &password).await.unwrap();
		context.sign_in("alice@example.com", &password).await.unwrap();

		let dashboard = StaffDashboard::new(context, harness.orders.clone());
		assert!(matches!(dashboard.refresh().await, Err(ViewError::NotStaff)));
	}
}
