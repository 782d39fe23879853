//! Request processing behind the HTTP routes.
//!
//! Each module turns transport input into calls on the engine's handlers.
//! The functions here map the core error types onto [`APIError`].

pub mod auth;
pub mod media;
pub mod orders;
pub mod staff;

use pharmacy_auth::AuthError;
use pharmacy_core::OrderError;
use pharmacy_media::MediaError;
use pharmacy_types::APIError;

/// Seconds clients should wait before retrying after a store outage.
const STORE_RETRY_AFTER_SECONDS: u64 = 5;

pub fn auth_error(err: AuthError) -> APIError {
	match err {
		AuthError::InvalidCredentials | AuthError::SessionExpired => {
			APIError::unauthorized(err.to_string())
		},
		AuthError::AlreadyRegistered(_) => APIError::Conflict {
			error_type: "ALREADY_REGISTERED".into(),
			message: err.to_string(),
		},
		AuthError::InvalidInput(_) => APIError::bad_request("INVALID_INPUT", err.to_string()),
		AuthError::WeakPassword(_) => APIError::bad_request("WEAK_PASSWORD", err.to_string()),
		AuthError::Storage(_) => APIError::ServiceUnavailable {
			error_type: "STORE_UNAVAILABLE".into(),
			message: err.to_string(),
			retry_after: Some(STORE_RETRY_AFTER_SECONDS),
		},
		AuthError::PasswordHash | AuthError::Configuration(_) => APIError::internal(err.to_string()),
	}
}

pub fn order_error(err: OrderError) -> APIError {
	match err {
		OrderError::NotFound(_) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: err.to_string(),
		},
		OrderError::Forbidden(_) => APIError::forbidden(err.to_string()),
		OrderError::ActionNotAvailable { .. } => APIError::Conflict {
			error_type: "ACTION_NOT_AVAILABLE".into(),
			message: err.to_string(),
		},
		OrderError::InvalidTransition { .. } => APIError::Conflict {
			error_type: "INVALID_TRANSITION".into(),
			message: err.to_string(),
		},
		OrderError::InvalidUpload(_) => APIError::bad_request("INVALID_UPLOAD", err.to_string()),
		OrderError::UploadTooLarge { .. } => APIError::PayloadTooLarge {
			message: err.to_string(),
		},
		OrderError::Upload(_) => APIError::BadGateway {
			error_type: "UPLOAD_FAILED".into(),
			message: err.to_string(),
		},
		OrderError::Media(_) => APIError::BadGateway {
			error_type: "MEDIA_ERROR".into(),
			message: err.to_string(),
		},
		OrderError::Storage(_) => APIError::ServiceUnavailable {
			error_type: "STORE_UNAVAILABLE".into(),
			message: err.to_string(),
			retry_after: Some(STORE_RETRY_AFTER_SECONDS),
		},
	}
}

pub fn media_error(err: MediaError) -> APIError {
	match err {
		MediaError::NotFound(_) => APIError::NotFound {
			error_type: "OBJECT_NOT_FOUND".into(),
			message: err.to_string(),
		},
		MediaError::Expired | MediaError::InvalidSignature => APIError::forbidden(err.to_string()),
		MediaError::InvalidKey(_) => APIError::bad_request("INVALID_KEY", err.to_string()),
		MediaError::Upload(_) | MediaError::Backend(_) => APIError::BadGateway {
			error_type: "MEDIA_ERROR".into(),
			message: err.to_string(),
		},
		MediaError::Configuration(_) => APIError::internal(err.to_string()),
	}
}
