//! Customer order submission, listing and prescription links.

use super::order_error;
use axum::extract::Multipart;
use pharmacy_core::{order_row, OrderScope, PharmacyEngine, PrescriptionUpload};
use pharmacy_types::{APIError, OrderRow, PrescriptionLinkResponse, Session};

/// The signed-in customer's own orders, newest first.
pub async fn list_own(engine: &PharmacyEngine, session: &Session) -> Result<Vec<OrderRow>, APIError> {
	let orders = engine
		.orders()
		.list_orders(&OrderScope::Owner(session.user_id.clone()))
		.await
		.map_err(order_error)?;
	Ok(orders.iter().map(|order| order_row(order, false)).collect())
}

pub async fn get(engine: &PharmacyEngine, session: &Session, order_id: &str) -> Result<OrderRow, APIError> {
	let order = engine
		.orders()
		.get_order(session, order_id)
		.await
		.map_err(order_error)?;
	Ok(order_row(&order, session.is_staff()))
}

/// Fields of the order submission form.
#[derive(Debug, Default)]
struct OrderForm {
	upload: Option<PrescriptionUpload>,
	notes: Option<String>,
	delivery_address: Option<String>,
}

fn form_error(err: axum::extract::multipart::MultipartError) -> APIError {
	APIError::bad_request("INVALID_FORM", err.body_text())
}

async fn read_form(mut multipart: Multipart) -> Result<OrderForm, APIError> {
	let mut form = OrderForm::default();
	while let Some(field) = multipart.next_field().await.map_err(form_error)? {
		let name = field.name().map(str::to_string);
		match name.as_deref() {
			Some("file") => {
				let file_name = field.file_name().unwrap_or_default().to_string();
				let content_type = field.content_type().unwrap_or_default().to_string();
				let bytes = field.bytes().await.map_err(form_error)?;
				// Browsers send an empty part when no file was chosen.
				if !bytes.is_empty() {
					form.upload = Some(PrescriptionUpload {
						file_name,
						content_type,
						bytes: bytes.to_vec(),
					});
				}
			},
			Some("notes") => form.notes = Some(field.text().await.map_err(form_error)?),
			Some("delivery_address") => {
				let address = field.text().await.map_err(form_error)?;
				form.delivery_address = Some(address.trim().to_string()).filter(|a| !a.is_empty());
			},
			other => tracing::debug!(field = ?other, "Ignoring unknown form field"),
		}
	}
	Ok(form)
}

/// Creates an order from a multipart form with optional `file`, `notes` and
/// `delivery_address` fields.
pub async fn create(
	engine: &PharmacyEngine,
	session: &Session,
	multipart: Multipart,
) -> Result<OrderRow, APIError> {
	let form = read_form(multipart).await?;
	let order = engine
		.orders()
		.create_order(session, form.upload, form.notes, form.delivery_address)
		.await
		.map_err(order_error)?;
	Ok(order_row(&order, false))
}

pub async fn prescription_link(
	engine: &PharmacyEngine,
	session: &Session,
	order_id: &str,
) -> Result<PrescriptionLinkResponse, APIError> {
	let link = engine
		.orders()
		.prescription_link(session, order_id)
		.await
		.map_err(order_error)?;

	Ok(match link {
		Some(signed) => PrescriptionLinkResponse {
			url: Some(signed.url),
			expires_at: Some(signed.expires_at),
		},
		None => PrescriptionLinkResponse {
			url: None,
			expires_at: None,
		},
	})
}
