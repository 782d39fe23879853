//! Sign-up, sign-in and sign-out.

use super::auth_error;
use pharmacy_core::PharmacyEngine;
use pharmacy_types::{APIError, AccountResponse, CredentialsRequest, SessionResponse};

pub async fn sign_up(
	engine: &PharmacyEngine,
	request: CredentialsRequest,
) -> Result<AccountResponse, APIError> {
	let account = engine
		.auth()
		.sign_up(&request.email, &request.password)
		.await
		.map_err(auth_error)?;

	Ok(AccountResponse {
		user_id: account.id,
		email: account.email,
		role: account.role,
	})
}

pub async fn sign_in(
	engine: &PharmacyEngine,
	request: CredentialsRequest,
) -> Result<SessionResponse, APIError> {
	engine
		.auth()
		.sign_in(&request.email, &request.password)
		.await
		.map(SessionResponse::from)
		.map_err(auth_error)
}

pub async fn sign_out(engine: &PharmacyEngine, token: &str) -> Result<(), APIError> {
	engine.auth().sign_out(token).await.map_err(auth_error)
}
