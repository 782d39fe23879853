//! Registry trait for named implementations.
//!
//! Each pluggable backend (record store, auth, media) exposes a `Registry`
//! type naming the configuration key it answers to and the factory that
//! builds it from its TOML table.

pub trait ImplementationRegistry {
	/// Key used under `<section>.implementations.<NAME>` in configuration.
	const NAME: &'static str;

	/// Factory signature for this kind of implementation.
	type Factory;

	fn factory() -> Self::Factory;
}
