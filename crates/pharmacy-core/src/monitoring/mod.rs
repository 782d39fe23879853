//! Background revalidation of views.

pub mod revalidation;

pub use revalidation::{
	EventScheduler, IntervalScheduler, ManualScheduler, ManualTrigger, RevalidationScheduler,
	RevalidationTrigger, Revalidator, RevalidatorHandle,
};
