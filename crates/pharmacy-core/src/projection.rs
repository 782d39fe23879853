//! Status badges and list rows shared by the staff and customer views.

use crate::state::available_actions;
use pharmacy_types::{truncate_id, Order, OrderRow, OrderStatus, StatusBadge};

const FALLBACK_COLOR: &str = "bg-gray-100";

/// Label and color for a status. Unknown statuses echo their raw value.
pub fn project(status: &OrderStatus) -> StatusBadge {
	let (label, color_class) = match status {
		OrderStatus::Pending => ("Pending", "bg-yellow-100 text-yellow-800"),
		OrderStatus::Accepted => ("Accepted", "bg-blue-100 text-blue-800"),
		OrderStatus::Ready => ("Rider on the way", "bg-indigo-100 text-indigo-800"),
		OrderStatus::Delivered => ("Delivered", "bg-green-100 text-green-800"),
		OrderStatus::Rejected => ("Rejected", "bg-red-100 text-red-800"),
		OrderStatus::Unknown(raw) => (raw.as_str(), FALLBACK_COLOR),
	};

	StatusBadge {
		label: label.to_string(),
		color_class: color_class.to_string(),
	}
}

pub fn project_raw(raw: &str) -> StatusBadge {
	project(&OrderStatus::parse(raw))
}

/// Builds the display row for an order.
///
/// Staff rows carry the enabled actions; customer rows never do.
pub fn order_row(order: &Order, with_actions: bool) -> OrderRow {
	OrderRow {
		id: order.id.clone(),
		short_id: truncate_id(&order.id),
		created_at: order.created_at,
		status: order.status.as_str().to_string(),
		badge: project(&order.status),
		notes: order.notes.clone(),
		has_prescription: order.has_prescription(),
		delivery_address: order.delivery_address.clone(),
		actions: with_actions.then(|| available_actions(&order.status)),
	}
}
