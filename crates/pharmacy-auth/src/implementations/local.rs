//! Local account store.
//!
//! Accounts live in the `users` collection keyed by normalized email, with
//! Argon2id password hashes. Sessions live in `sessions` keyed by an opaque
//! random token and carry a storage TTL matching their expiry, so backends
//! that honour TTLs drop them without help.

use crate::{AuthError, AuthInterface};
use argon2::{
	password_hash::{rand_core::OsRng, rand_core::RngCore, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pharmacy_storage::{StorageError, StorageService};
use pharmacy_types::{
	normalize_email, truncate_id, Collection, ConfigSchema, Field, FieldType, ImplementationRegistry, Role,
	Schema, SecretString, Session, UserAccount, ValidationError,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

pub struct LocalAuth {
	storage: Arc<StorageService>,
	session_ttl: Duration,
	min_password_length: usize,
	/// Normalized emails granted the staff role.
	staff_emails: HashSet<String>,
}

impl LocalAuth {
	pub fn new(
		storage: Arc<StorageService>,
		session_ttl: Duration,
		min_password_length: usize,
		staff_emails: impl IntoIterator<Item = String>,
	) -> Self {
		Self {
			storage,
			session_ttl,
			min_password_length,
			staff_emails: staff_emails.into_iter().map(|e| normalize_email(&e)).collect(),
		}
	}

	fn role_for(&self, email: &str) -> Role {
		if self.staff_emails.contains(email) {
			Role::Staff
		} else {
			Role::Customer
		}
	}

	fn validate_credentials(&self, email: &str, password: &SecretString) -> Result<(), AuthError> {
		if email.is_empty() || password.is_empty() {
			return Err(AuthError::InvalidInput(
				"email and password are required".into(),
			));
		}
		if !email.contains('@') {
			return Err(AuthError::InvalidInput(format!("'{}' is not an email address", email)));
		}
		if password.expose_secret().chars().count() < self.min_password_length {
			return Err(AuthError::WeakPassword(format!(
				"password must be at least {} characters",
				self.min_password_length
			)));
		}
		Ok(())
	}
}

fn hash_password(password: &SecretString) -> Result<String, AuthError> {
	let salt = SaltString::generate(&mut OsRng);
	Argon2::default()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &SecretString, hash: &str) -> Result<(), AuthError> {
	let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
	Argon2::default()
		.verify_password(password.as_bytes(), &parsed)
		.map_err(|_| AuthError::InvalidCredentials)
}

/// 256 random bits, hex encoded.
fn generate_token() -> String {
	let mut bytes = [0u8; 32];
	OsRng.fill_bytes(&mut bytes);
	hex::encode(bytes)
}

#[async_trait]
impl AuthInterface for LocalAuth {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAuthSchema)
	}

	async fn sign_up(&self, email: &str, password: &SecretString) -> Result<UserAccount, AuthError> {
		let email = normalize_email(email);
		self.validate_credentials(&email, password)?;

		let account = UserAccount {
			id: uuid::Uuid::new_v4().to_string(),
			role: self.role_for(&email),
			password_hash: hash_password(password)?,
			email,
			created_at: Utc::now(),
		};

		self.storage
			.insert(Collection::Users, &account.email, &account)
			.await
			.map_err(|e| match e {
				StorageError::AlreadyExists(_) => AuthError::AlreadyRegistered(account.email.clone()),
				other => AuthError::Storage(other.to_string()),
			})?;

		Ok(account)
	}

	async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
		let email = normalize_email(email);
		if email.is_empty() || password.is_empty() {
			return Err(AuthError::InvalidInput(
				"email and password are required".into(),
			));
		}

		let account: UserAccount = match self.storage.retrieve(Collection::Users, &email).await {
			Ok(account) => account,
			Err(StorageError::NotFound) => return Err(AuthError::InvalidCredentials),
			Err(e) => return Err(AuthError::Storage(e.to_string())),
		};
		verify_password(password, &account.password_hash)?;

		let now = Utc::now();
		let ttl = ChronoDuration::from_std(self.session_ttl)
			.map_err(|e| AuthError::Configuration(e.to_string()))?;
		// Staff membership follows current configuration, not sign-up time.
		let role = self.role_for(&account.email);
		if role != account.role {
			tracing::info!(
				user_id = %truncate_id(&account.id),
				from = ?account.role,
				to = ?role,
				"Account role changed by configuration"
			);
		}
		let session = Session {
			token: generate_token(),
			user_id: account.id,
			email: account.email,
			role,
			created_at: now,
			expires_at: now + ttl,
		};

		self.storage
			.insert_with_ttl(Collection::Sessions, &session.token, &session, Some(self.session_ttl))
			.await
			.map_err(|e| AuthError::Storage(e.to_string()))?;

		Ok(session)
	}

	async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
		self.storage
			.remove(Collection::Sessions, token)
			.await
			.map_err(|e| AuthError::Storage(e.to_string()))
	}

	async fn current_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
		if token.is_empty() {
			return Ok(None);
		}

		let session: Session = match self.storage.retrieve(Collection::Sessions, token).await {
			Ok(session) => session,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(AuthError::Storage(e.to_string())),
		};

		if session.is_expired_at(Utc::now()) {
			tracing::debug!(user_id = %truncate_id(&session.user_id), "Dropping expired session");
			self.sign_out(token).await?;
			return Ok(None);
		}

		Ok(Some(session))
	}
}

pub struct LocalAuthSchema;

impl ConfigSchema for LocalAuthSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![
			Field::optional(
				"session_ttl_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(30 * 86_400),
				},
			),
			Field::optional(
				"min_password_length",
				FieldType::Integer {
					min: Some(1),
					max: Some(128),
				},
			),
			Field::optional("staff_emails", FieldType::Array(Box::new(FieldType::String))).with_check(
				|value| {
					let emails = value.as_array().into_iter().flatten();
					match emails.filter_map(|e| e.as_str()).find(|e| !e.contains('@')) {
						Some(bad) => Err(format!("'{}' is not an email address", bad)),
						None => Ok(()),
					}
				},
			),
		])
		.validate(config)
	}
}

/// Creates the local auth backend.
///
/// Configuration:
/// - `session_ttl_seconds`: session lifetime (default 86400)
/// - `min_password_length`: minimum password length (default 6)
/// - `staff_emails`: accounts granted the staff role
pub fn create_auth(
	config: &toml::Value,
	storage: Arc<StorageService>,
) -> Result<Box<dyn AuthInterface>, AuthError> {
	LocalAuthSchema
		.validate(config)
		.map_err(|e| AuthError::Configuration(e.to_string()))?;

	let session_ttl = config
		.get("session_ttl_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_SESSION_TTL_SECONDS);
	let min_password_length = config
		.get("min_password_length")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_MIN_PASSWORD_LENGTH);
	let staff_emails: Vec<String> = config
		.get("staff_emails")
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();

	Ok(Box::new(LocalAuth::new(
		storage,
		Duration::from_secs(session_ttl),
		min_password_length,
		staff_emails,
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AuthFactory;

	fn factory() -> Self::Factory {
		create_auth
	}
}

impl crate::AuthRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use pharmacy_storage::implementations::memory::MemoryStorage;

	fn auth_with_ttl(ttl: Duration) -> LocalAuth {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		LocalAuth::new(storage, ttl, 6, vec!["Staff@Pharmacy.test".to_string()])
	}

	fn auth() -> LocalAuth {
		auth_with_ttl(Duration::from_secs(3600))
	}

	fn pw(s: &str) -> SecretString {
		SecretString::from(s)
	}

	#[tokio::test]
	async fn test_sign_up_then_sign_in() {
		let auth = auth();
		let account = auth.sign_up("  Alice@Example.com ", &pw("secret-pw")).await.unwrap();
		assert_eq!(account.email, "alice@example.com");
		assert_eq!(account.role, Role::Customer);
		assert!(account.password_hash.starts_with("$argon2"));

		let session = auth.sign_in("alice@example.com", &pw("secret-pw")).await.unwrap();
		assert_eq!(session.user_id, account.id);
		assert_eq!(session.token.len(), 64);

		let resolved = auth.current_session(&session.token).await.unwrap();
		assert_eq!(resolved, Some(session));
	}

	#[tokio::test]
	async fn test_sign_up_requires_both_fields() {
		let auth = auth();
		assert!(matches!(
			auth.sign_up("", &pw("secret-pw")).await,
			Err(AuthError::InvalidInput(_))
		));
		assert!(matches!(
			auth.sign_up("bob@example.com", &pw("")).await,
			Err(AuthError::InvalidInput(_))
		));
		assert!(matches!(
			auth.sign_up("bob@example.com", &pw("123")).await,
			Err(AuthError::WeakPassword(_))
		));
	}

	#[tokio::test]
	async fn test_duplicate_sign_up() {
		let auth = auth();
		auth.sign_up("bob@example.com", &pw("secret-pw")).await.unwrap();
		assert!(matches!(
			auth.sign_up("BOB@example.com", &pw("another-pw")).await,
			Err(AuthError::AlreadyRegistered(_))
		));
	}

	#[tokio::test]
	async fn test_wrong_password_and_unknown_user_look_alike() {
		let auth = auth();
		auth.sign_up("carol@example.com", &pw("secret-pw")).await.unwrap();

		assert!(matches!(
			auth.sign_in("carol@example.com", &pw("wrong-pw")).await,
			Err(AuthError::InvalidCredentials)
		));
		assert!(matches!(
			auth.sign_in("nobody@example.com", &pw("secret-pw")).await,
			Err(AuthError::InvalidCredentials)
		));
	}

	#[tokio::test]
	async fn test_staff_role_from_config() {
		let auth = auth();
		let account = auth.sign_up("staff@pharmacy.test", &pw("secret-pw")).await.unwrap();
		assert_eq!(account.role, Role::Staff);

		let session = auth.sign_in("staff@pharmacy.test", &pw("secret-pw")).await.unwrap();
		assert!(session.is_staff());
	}

	#[tokio::test]
	async fn test_staff_role_follows_current_config() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let before = LocalAuth::new(
			storage.clone(),
			Duration::from_secs(3600),
			6,
			vec!["boss@pharmacy.test".to_string()],
		);
		before.sign_up("boss@pharmacy.test", &pw("secret-pw")).await.unwrap();
		let session = before.sign_in("boss@pharmacy.test", &pw("secret-pw")).await.unwrap();
		assert!(session.is_staff());

		let after = LocalAuth::new(storage, Duration::from_secs(3600), 6, Vec::<String>::new());
		let session = after.sign_in("boss@pharmacy.test", &pw("secret-pw")).await.unwrap();
		assert_eq!(session.role, Role::Customer);
	}

	#[tokio::test]
	async fn test_sign_out_invalidates_session() {
		let auth = auth();
		auth.sign_up("dan@example.com", &pw("secret-pw")).await.unwrap();
		let session = auth.sign_in("dan@example.com", &pw("secret-pw")).await.unwrap();

		auth.sign_out(&session.token).await.unwrap();
		assert_eq!(auth.current_session(&session.token).await.unwrap(), None);
		// Signing out twice is harmless.
		auth.sign_out(&session.token).await.unwrap();
	}

	#[tokio::test]
	async fn test_session_expires() {
		let auth = auth_with_ttl(Duration::from_millis(30));
		auth.sign_up("eve@example.com", &pw("secret-pw")).await.unwrap();
		let session = auth.sign_in("eve@example.com", &pw("secret-pw")).await.unwrap();

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert_eq!(auth.current_session(&session.token).await.unwrap(), None);
	}

	#[test]
	fn test_schema_rejects_bad_staff_email() {
		let config: toml::Value = toml::from_str("staff_emails = [\"not-an-email\"]").unwrap();
		assert!(LocalAuthSchema.validate(&config).is_err());

		let config: toml::Value =
			toml::from_str("staff_emails = [\"a@b.c\"]\nsession_ttl_seconds = 60").unwrap();
		assert!(LocalAuthSchema.validate(&config).is_ok());
	}
}
