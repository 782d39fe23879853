//! Application session context.
//!
//! Holds who is signed in and tells views when that changes. Every change of
//! session bumps a generation counter; views compare it with the generation
//! their data was loaded under and discard data that belongs to a previous
//! session.

use super::event_bus::EventBus;
use pharmacy_auth::{AuthError, AuthService};
use pharmacy_types::{truncate_id, AuthEvent, PharmacyEvent, SecretString, Session, UserAccount};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
	#[default]
	SignedOut,
	SignedIn(Session),
}

impl SessionState {
	pub fn session(&self) -> Option<&Session> {
		match self {
			SessionState::SignedIn(session) => Some(session),
			SessionState::SignedOut => None,
		}
	}
}

/// The session state together with the generation it was set at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
	pub state: SessionState,
	pub generation: u64,
}

pub struct AppContext {
	auth: Arc<AuthService>,
	event_bus: EventBus,
	state: watch::Sender<SessionSnapshot>,
}

impl AppContext {
	pub fn new(auth: Arc<AuthService>, event_bus: EventBus) -> Self {
		let (state, _) = watch::channel(SessionSnapshot::default());
		Self {
			auth,
			event_bus,
			state,
		}
	}

	pub fn current(&self) -> SessionState {
		self.state.borrow().state.clone()
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		self.state.borrow().clone()
	}

	pub fn generation(&self) -> u64 {
		self.state.borrow().generation
	}

	/// Receives a notification on every session change.
	pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
		self.state.subscribe()
	}

	fn set(&self, state: SessionState) -> u64 {
		let mut generation = 0;
		self.state.send_modify(|snapshot| {
			snapshot.state = state;
			snapshot.generation += 1;
			generation = snapshot.generation;
		});
		generation
	}

	/// Registers an account. The context stays signed out.
	pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<UserAccount, AuthError> {
		self.auth.sign_up(email, password).await
	}

	pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
		let session = self.auth.sign_in(email, password).await?;
		self.set(SessionState::SignedIn(session.clone()));
		self.event_bus
			.publish(PharmacyEvent::Auth(AuthEvent::SignedIn {
				user_id: session.user_id.clone(),
			}))
			.ok();
		Ok(session)
	}

	/// Ends the current session.
	///
	/// The context is signed out even when the auth backend fails to drop
	/// the session; the failure is logged.
	pub async fn sign_out(&self) {
		let SessionState::SignedIn(session) = self.current() else {
			return;
		};

		if let Err(e) = self.auth.sign_out(&session.token).await {
			tracing::warn!(user_id = %truncate_id(&session.user_id), error = %e, "Failed to end session at the auth backend");
		}
		self.set(SessionState::SignedOut);
		self.event_bus
			.publish(PharmacyEvent::Auth(AuthEvent::SignedOut {
				user_id: session.user_id,
			}))
			.ok();
	}

	/// Resumes a session from a stored token.
	pub async fn restore(&self, token: &str) -> Result<Option<Session>, AuthError> {
		match self.auth.current_session(token).await? {
			Some(session) => {
				self.set(SessionState::SignedIn(session.clone()));
				Ok(Some(session))
			},
			None => {
				if self.current() != SessionState::SignedOut {
					self.set(SessionState::SignedOut);
				}
				Ok(None)
			},
		}
	}
}
