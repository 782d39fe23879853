//! Catalog product types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product listed in the pharmacy catalog.
///
/// The catalog is read-only from the application's point of view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub price: Decimal,
	/// Object storage key of the product image.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_ref: Option<String>,
	/// Whether the product can only be dispensed against a prescription.
	#[serde(default)]
	pub requires_prescription: bool,
}
