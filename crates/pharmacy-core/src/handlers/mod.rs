//! Request-level operations over the storage, media and auth services.

pub mod catalog;
pub mod order;

pub use catalog::CatalogService;
pub use order::{OrderError, OrderHandler, OrderScope, OrderSettings, PrescriptionUpload};
