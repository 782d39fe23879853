//! Which staff actions the dashboard offers for an order.
//!
//! The gate is pure: it reads a status and never mutates anything. Every
//! action it enables targets a transition [`can_transition`] allows.

use super::order::can_transition;
use pharmacy_types::{ActionSet, OrderStatus, StaffAction};

/// Returns the staff actions enabled for an order in `status`.
pub fn available_actions(status: &OrderStatus) -> ActionSet {
	StaffAction::ALL
		.into_iter()
		.filter(|action| can_transition(status, &action.target()))
		.collect()
}
