//! Core of the pharmacy delivery service.
//!
//! Ties the record store, auth and object storage services together into a
//! [`PharmacyEngine`]: the order state machine and staff action gate, the
//! order list projection, the customer and staff views with their
//! revalidation schedulers, and the builder that assembles it all from
//! configuration.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod monitoring;
pub mod projection;
pub mod state;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, PharmacyBuilder, PharmacyFactories};
pub use engine::context::{AppContext, SessionSnapshot, SessionState};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, PharmacyEngine};
pub use handlers::{CatalogService, OrderError, OrderHandler, OrderScope, PrescriptionUpload};
pub use projection::{order_row, project};
pub use state::available_actions;
pub use views::{CustomerOrders, Refresh, StaffDashboard, ViewError};
