//! Order types for the pharmacy delivery service.
//!
//! An order is a customer's request to have a prescription fulfilled and
//! delivered. It moves through a fixed status lifecycle driven by staff
//! actions; the transition rules themselves live in `pharmacy-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Notes recorded when the customer submits a prescription without any.
pub const DEFAULT_ORDER_NOTES: &str = "Prescription uploaded via app";

/// A prescription-fulfillment order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Unique identifier, assigned at creation.
	pub id: String,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Time of the last status write, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Object storage key of the uploaded prescription.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prescription_ref: Option<String>,
	/// Free-text annotation captured at creation.
	#[serde(default)]
	pub notes: String,
	/// Where the order should be delivered.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery_address: Option<String>,
	/// The customer who created the order.
	pub owner_id: String,
}

impl Order {
	/// Creates a new pending order owned by `owner_id`.
	pub fn new(
		owner_id: impl Into<String>,
		prescription_ref: Option<String>,
		notes: Option<String>,
		delivery_address: Option<String>,
	) -> Self {
		let notes = notes
			.map(|n| n.trim().to_string())
			.filter(|n| !n.is_empty())
			.unwrap_or_else(|| DEFAULT_ORDER_NOTES.to_string());

		Self {
			id: Uuid::new_v4().to_string(),
			created_at: Utc::now(),
			updated_at: None,
			status: OrderStatus::Pending,
			prescription_ref,
			notes,
			delivery_address: delivery_address.filter(|a| !a.trim().is_empty()),
			owner_id: owner_id.into(),
		}
	}

	/// Whether a prescription file is attached.
	pub fn has_prescription(&self) -> bool {
		self.prescription_ref
			.as_deref()
			.is_some_and(|r| !r.is_empty())
	}
}

/// Lifecycle status of an order.
///
/// Stored as a lowercase string. Values outside the known set are kept
/// verbatim in [`OrderStatus::Unknown`] instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
	/// Submitted by the customer, awaiting triage.
	Pending,
	/// Accepted by the pharmacy.
	Accepted,
	/// Prepared and handed to a rider.
	Ready,
	/// Delivered to the customer.
	Delivered,
	/// Refused by the pharmacy.
	Rejected,
	/// A stored value this build does not recognise.
	Unknown(String),
}

impl OrderStatus {
	/// All known statuses in lifecycle order.
	pub const KNOWN: [OrderStatus; 5] = [
		OrderStatus::Pending,
		OrderStatus::Accepted,
		OrderStatus::Ready,
		OrderStatus::Delivered,
		OrderStatus::Rejected,
	];

	/// Returns the stored string form.
	pub fn as_str(&self) -> &str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Accepted => "accepted",
			OrderStatus::Ready => "ready",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Rejected => "rejected",
			OrderStatus::Unknown(raw) => raw,
		}
	}

	/// Parses a stored value, keeping unrecognised input as `Unknown`.
	pub fn parse(raw: &str) -> Self {
		match raw {
			"pending" => OrderStatus::Pending,
			"accepted" => OrderStatus::Accepted,
			"ready" => OrderStatus::Ready,
			"delivered" => OrderStatus::Delivered,
			"rejected" => OrderStatus::Rejected,
			other => OrderStatus::Unknown(other.to_string()),
		}
	}
}

impl From<String> for OrderStatus {
	fn from(raw: String) -> Self {
		OrderStatus::parse(&raw)
	}
}

impl From<OrderStatus> for String {
	fn from(status: OrderStatus) -> Self {
		status.as_str().to_string()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An action staff can take on an order from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffAction {
	/// Refuse the order.
	Reject,
	/// Take the order on.
	Accept,
	/// Hand the prepared order to a rider.
	CallRider,
	/// Record the delivery.
	MarkDelivered,
}

impl StaffAction {
	/// Every staff action, in dashboard button order.
	pub const ALL: [StaffAction; 4] = [
		StaffAction::Reject,
		StaffAction::Accept,
		StaffAction::CallRider,
		StaffAction::MarkDelivered,
	];

	/// The status this action requests.
	pub fn target(&self) -> OrderStatus {
		match self {
			StaffAction::Reject => OrderStatus::Rejected,
			StaffAction::Accept => OrderStatus::Accepted,
			StaffAction::CallRider => OrderStatus::Ready,
			StaffAction::MarkDelivered => OrderStatus::Delivered,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			StaffAction::Reject => "reject",
			StaffAction::Accept => "accept",
			StaffAction::CallRider => "call_rider",
			StaffAction::MarkDelivered => "mark_delivered",
		}
	}
}

impl fmt::Display for StaffAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StaffAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"reject" => Ok(StaffAction::Reject),
			"accept" => Ok(StaffAction::Accept),
			"call_rider" => Ok(StaffAction::CallRider),
			"mark_delivered" => Ok(StaffAction::MarkDelivered),
			other => Err(format!("Unknown staff action: {}", other)),
		}
	}
}

/// The set of staff actions currently enabled for an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<StaffAction>);

impl ActionSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, action: StaffAction) {
		self.0.insert(action);
	}

	pub fn contains(&self, action: StaffAction) -> bool {
		self.0.contains(&action)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = StaffAction> + '_ {
		self.0.iter().copied()
	}
}

impl FromIterator<StaffAction> for ActionSet {
	fn from_iter<I: IntoIterator<Item = StaffAction>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// Display label and color class for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBadge {
	pub label: String,
	#[serde(rename = "colorClass")]
	pub color_class: String,
}
