//! Common types for the pharmacy delivery service.
//!
//! Every crate in the workspace exchanges data through the types defined
//! here: orders and their status lifecycle, catalog products, accounts and
//! sessions, events, API payloads and the configuration schema used to
//! validate pluggable implementations.

/// API request/response types and the structured error mapped to HTTP.
pub mod api;
/// Accounts, roles and sessions.
pub mod auth;
/// Events published on the engine's event bus.
pub mod events;
/// Orders, statuses, staff actions and display badges.
pub mod order;
/// Read-only catalog products.
pub mod product;
/// Base trait for named, self-registering implementations.
pub mod registry;
/// Redacting wrapper for secrets loaded from configuration.
pub mod secret_string;
/// Record store collection names.
pub mod storage;
/// Small helpers shared across crates.
pub mod utils;
/// Schema validation for per-implementation TOML tables.
pub mod validation;

pub use api::*;
pub use auth::*;
pub use events::*;
pub use order::*;
pub use product::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
