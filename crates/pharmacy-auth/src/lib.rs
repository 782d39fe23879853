//! Authentication for the pharmacy delivery service.
//!
//! Defines the auth collaborator ([`AuthInterface`]) and a thin
//! [`AuthService`] wrapper. Accounts and sessions are opaque to the rest of
//! the system: callers exchange credentials for a [`Session`] and later
//! resolve a bearer token back to it.

use async_trait::async_trait;
use pharmacy_storage::StorageService;
use pharmacy_types::{truncate_id, ConfigSchema, ImplementationRegistry, SecretString, Session, UserAccount};
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AuthError {
	/// Unknown email or wrong password. Deliberately does not say which.
	#[error("Invalid email or password")]
	InvalidCredentials,
	#[error("An account already exists for {0}")]
	AlreadyRegistered(String),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Weak password: {0}")]
	WeakPassword(String),
	#[error("Session expired or unknown")]
	SessionExpired,
	#[error("Password hashing failed")]
	PasswordHash,
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

#[async_trait]
pub trait AuthInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Registers a new account. Both fields must be non-empty.
	async fn sign_up(&self, email: &str, password: &SecretString) -> Result<UserAccount, AuthError>;

	/// Exchanges credentials for a new session.
	async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError>;

	/// Ends a session. Unknown tokens are ignored.
	async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

	/// Resolves a token to its live session, if any.
	async fn current_session(&self, token: &str) -> Result<Option<Session>, AuthError>;
}

/// Auth backends receive the record store they keep accounts and sessions in.
pub type AuthFactory =
	fn(&toml::Value, Arc<StorageService>) -> Result<Box<dyn AuthInterface>, AuthError>;

pub trait AuthRegistry: ImplementationRegistry<Factory = AuthFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, AuthFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Logs auth outcomes around the configured implementation.
pub struct AuthService {
	implementation: Box<dyn AuthInterface>,
}

impl AuthService {
	pub fn new(implementation: Box<dyn AuthInterface>) -> Self {
		Self { implementation }
	}

	pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<UserAccount, AuthError> {
		let account = self.implementation.sign_up(email, password).await?;
		tracing::info!(user_id = %truncate_id(&account.id), role = %account.role, "Account registered");
		Ok(account)
	}

	pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
		match self.implementation.sign_in(email, password).await {
			Ok(session) => {
				tracing::info!(user_id = %truncate_id(&session.user_id), role = %session.role, "Signed in");
				Ok(session)
			},
			Err(e) => {
				tracing::debug!(error = %e, "Sign-in refused");
				Err(e)
			},
		}
	}

	pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
		self.implementation.sign_out(token).await
	}

	pub async fn current_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
		self.implementation.current_session(token).await
	}
}
