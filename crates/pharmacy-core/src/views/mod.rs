//! View models backing the staff dashboard and the customer order list.
//!
//! A view owns the rows it displays and reloads them on request. Reloads
//! fetch first and replace the view state in one step at the end, so a
//! refresh abandoned part way leaves the previous rows in place.

pub mod customer;
pub mod dashboard;

pub use customer::CustomerOrders;
pub use dashboard::{DashboardError, PendingUpdate, StaffDashboard, UpdateOutcome};

use crate::handlers::OrderError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
	#[error("Not signed in")]
	NotSignedIn,
	#[error("Staff role required")]
	NotStaff,
	#[error("Failed to load orders: {0}")]
	Load(String),
	#[error("Failed to submit order: {0}")]
	Submit(#[from] OrderError),
}

/// A view whose data can be reloaded from the store.
#[async_trait]
pub trait Refresh: Send + Sync {
	fn name(&self) -> &'static str;

	async fn refresh(&self) -> Result<(), ViewError>;
}
