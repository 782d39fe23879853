//! Record store collection names.

use std::fmt;
use std::str::FromStr;

/// Collections held by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
	/// Prescription orders.
	Orders,
	/// Read-only product catalog.
	Products,
	/// Registered accounts, keyed by normalized email.
	Users,
	/// Active sessions, keyed by token.
	Sessions,
}

impl Collection {
	pub fn as_str(&self) -> &'static str {
		match self {
			Collection::Orders => "orders",
			Collection::Products => "products",
			Collection::Users => "users",
			Collection::Sessions => "sessions",
		}
	}

	/// Returns an iterator over all collections.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Products,
			Self::Users,
			Self::Sessions,
		]
		.into_iter()
	}
}

impl fmt::Display for Collection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Collection {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|c| c.as_str() == s).ok_or(())
	}
}
