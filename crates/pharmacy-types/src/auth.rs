//! Account and session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a signed-in user is allowed to see and do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Sees and creates only their own orders.
	#[default]
	Customer,
	/// Sees every order and drives status transitions.
	Staff,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Customer => write!(f, "customer"),
			Role::Staff => write!(f, "staff"),
		}
	}
}

/// A registered account as persisted by the auth backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
	pub id: String,
	/// Normalized (trimmed, lowercase) email address.
	pub email: String,
	/// PHC-format password hash.
	pub password_hash: String,
	#[serde(default)]
	pub role: Role,
	pub created_at: DateTime<Utc>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Opaque bearer token identifying the session.
	pub token: String,
	pub user_id: String,
	pub email: String,
	pub role: Role,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl Session {
	pub fn is_staff(&self) -> bool {
		self.role == Role::Staff
	}

	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}
}

/// Normalizes an email address for lookups and storage.
pub fn normalize_email(email: &str) -> String {
	email.trim().to_lowercase()
}
