//! API types for the pharmacy HTTP API.

use crate::{ActionSet, Role, SecretString, Session, StatusBadge};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials posted to sign-in and sign-up.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
	pub email: String,
	pub password: SecretString,
}

/// Session details returned after sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
	pub token: String,
	#[serde(rename = "userId")]
	pub user_id: String,
	pub email: String,
	pub role: Role,
	#[serde(rename = "expiresAt")]
	pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
	fn from(session: Session) -> Self {
		Self {
			token: session.token,
			user_id: session.user_id,
			email: session.email,
			role: session.role,
			expires_at: session.expires_at,
		}
	}
}

/// Account details returned after sign-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
	#[serde(rename = "userId")]
	pub user_id: String,
	pub email: String,
	pub role: Role,
}

/// A display-ready order as listed to customers and staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
	pub id: String,
	#[serde(rename = "shortId")]
	pub short_id: String,
	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
	/// Raw stored status.
	pub status: String,
	pub badge: StatusBadge,
	pub notes: String,
	#[serde(rename = "hasPrescription")]
	pub has_prescription: bool,
	#[serde(rename = "deliveryAddress", skip_serializing_if = "Option::is_none")]
	pub delivery_address: Option<String>,
	/// Enabled staff actions; only present on staff listings.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub actions: Option<ActionSet>,
}

/// Response for a prescription link request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionLinkResponse {
	/// Signed URL, or `None` when no prescription is attached.
	pub url: Option<String>,
	#[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<DateTime<Utc>>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds.
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// 400
	BadRequest { error_type: String, message: String },
	/// 401
	Unauthorized { message: String },
	/// 403
	Forbidden { message: String },
	/// 404
	NotFound { error_type: String, message: String },
	/// 409
	Conflict { error_type: String, message: String },
	/// 413
	PayloadTooLarge { message: String },
	/// 502, an upstream collaborator (object storage) failed.
	BadGateway { error_type: String, message: String },
	/// 503
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// 500
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::PayloadTooLarge { .. } => 413,
			APIError::BadGateway { .. } => 502,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	pub fn unauthorized(message: impl Into<String>) -> Self {
		APIError::Unauthorized {
			message: message.into(),
		}
	}

	pub fn forbidden(message: impl Into<String>) -> Self {
		APIError::Forbidden {
			message: message.into(),
		}
	}

	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: message.into(),
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, retry_after) = match self {
			APIError::Unauthorized { message } => ("UNAUTHORIZED", message, None),
			APIError::Forbidden { message } => ("FORBIDDEN", message, None),
			APIError::PayloadTooLarge { message } => ("PAYLOAD_TOO_LARGE", message, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type.as_str(), message, *retry_after),
			APIError::BadRequest { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::BadGateway { error_type, message }
			| APIError::InternalServerError { error_type, message } => {
				(error_type.as_str(), message, None)
			},
		};

		ErrorResponse {
			error: error.to_string(),
			message: message.clone(),
			details: None,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
