//! Staff-only listing and status actions.

use super::order_error;
use pharmacy_core::{order_row, OrderError, OrderScope, PharmacyEngine};
use pharmacy_types::{APIError, OrderRow, Session, StaffAction};

fn require_staff(session: &Session) -> Result<(), APIError> {
	if session.is_staff() {
		Ok(())
	} else {
		Err(APIError::forbidden("Staff role required"))
	}
}

/// Every order, newest first, with the actions the gate enables.
pub async fn list_all(engine: &PharmacyEngine, session: &Session) -> Result<Vec<OrderRow>, APIError> {
	require_staff(session)?;
	let orders = engine
		.orders()
		.list_orders(&OrderScope::Staff)
		.await
		.map_err(order_error)?;
	Ok(orders.iter().map(|order| order_row(order, true)).collect())
}

pub async fn apply_action(
	engine: &PharmacyEngine,
	session: &Session,
	order_id: &str,
	action: &str,
) -> Result<OrderRow, APIError> {
	require_staff(session)?;
	let action: StaffAction = action
		.parse()
		.map_err(|e: String| APIError::bad_request("UNKNOWN_ACTION", e))?;

	match engine.orders().apply_staff_action(session, order_id, action).await {
		Ok(order) => Ok(order_row(&order, true)),
		// A failed status write is reported as retryable; clients reload.
		Err(OrderError::Storage(e)) => Err(APIError::ServiceUnavailable {
			error_type: "UPDATE_FAILED".into(),
			message: format!("Status update failed: {}", e),
			retry_after: Some(super::STORE_RETRY_AFTER_SECONDS),
		}),
		Err(e) => Err(order_error(e)),
	}
}
