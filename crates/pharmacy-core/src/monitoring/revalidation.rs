//! Deciding when views reload.
//!
//! A [`RevalidationScheduler`] yields triggers; a [`Revalidator`] task
//! refreshes one view per trigger. Three schedulers are provided: a fixed
//! interval, explicit manual triggers, and pushes from the event bus.

use crate::engine::event_bus::EventBus;
use crate::views::Refresh;
use async_trait::async_trait;
use pharmacy_types::PharmacyEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Interval used when none is configured.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationTrigger {
	Interval,
	Manual,
	Event,
}

#[async_trait]
pub trait RevalidationScheduler: Send {
	/// Waits for the next trigger. `None` ends revalidation.
	async fn next_trigger(&mut self) -> Option<RevalidationTrigger>;
}

/// Fires once immediately, then every `period`.
pub struct IntervalScheduler {
	interval: Interval,
}

impl IntervalScheduler {
	pub fn new(period: Duration) -> Self {
		let mut interval = interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		Self { interval }
	}
}

impl Default for IntervalScheduler {
	fn default() -> Self {
		Self::new(DEFAULT_REFRESH_INTERVAL)
	}
}

#[async_trait]
impl RevalidationScheduler for IntervalScheduler {
	async fn next_trigger(&mut self) -> Option<RevalidationTrigger> {
		self.interval.tick().await;
		Some(RevalidationTrigger::Interval)
	}
}

/// Cloneable handle for requesting a refresh, e.g. from a "Refresh" button.
#[derive(Clone)]
pub struct ManualTrigger {
	sender: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
	/// Requests a refresh. Returns `false` once the scheduler is gone.
	pub fn trigger(&self) -> bool {
		self.sender.send(()).is_ok()
	}
}

/// Fires whenever a [`ManualTrigger`] asks. Ends when every handle is dropped.
pub struct ManualScheduler {
	receiver: mpsc::UnboundedReceiver<()>,
}

impl ManualScheduler {
	pub fn new() -> (Self, ManualTrigger) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { receiver }, ManualTrigger { sender })
	}
}

#[async_trait]
impl RevalidationScheduler for ManualScheduler {
	async fn next_trigger(&mut self) -> Option<RevalidationTrigger> {
		self.receiver.recv().await?;
		Some(RevalidationTrigger::Manual)
	}
}

/// Fires on order and session events from the event bus.
pub struct EventScheduler {
	receiver: broadcast::Receiver<PharmacyEvent>,
}

impl EventScheduler {
	pub fn new(event_bus: &EventBus) -> Self {
		Self {
			receiver: event_bus.subscribe(),
		}
	}
}

#[async_trait]
impl RevalidationScheduler for EventScheduler {
	async fn next_trigger(&mut self) -> Option<RevalidationTrigger> {
		match self.receiver.recv().await {
			Ok(PharmacyEvent::Order(_)) | Ok(PharmacyEvent::Auth(_)) => {
				Some(RevalidationTrigger::Event)
			},
			Err(broadcast::error::RecvError::Lagged(missed)) => {
				tracing::debug!(missed, "Event scheduler lagged, refreshing");
				Some(RevalidationTrigger::Event)
			},
			Err(broadcast::error::RecvError::Closed) => None,
		}
	}
}

/// Runs refreshes for one view until stopped.
pub struct Revalidator;

impl Revalidator {
	pub fn spawn<V, S>(view: Arc<V>, mut scheduler: S) -> RevalidatorHandle
	where
		V: Refresh + 'static,
		S: RevalidationScheduler + 'static,
	{
		let task = tokio::spawn(async move {
			while let Some(trigger) = scheduler.next_trigger().await {
				if let Err(e) = view.refresh().await {
					tracing::warn!(view = view.name(), trigger = ?trigger, error = %e, "Refresh failed");
				}
			}
			tracing::debug!(view = view.name(), "Revalidation finished");
		});
		RevalidatorHandle { task: Some(task) }
	}
}

/// Owns a running revalidation task.
///
/// Stopping or dropping the handle aborts the task, abandoning any refresh
/// in flight before it writes to the view.
pub struct RevalidatorHandle {
	task: Option<JoinHandle<()>>,
}

impl RevalidatorHandle {
	pub async fn stop(mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
			let _ = task.await;
		}
	}

	pub fn is_finished(&self) -> bool {
		self.task.as_ref().is_none_or(|task| task.is_finished())
	}
}

impl Drop for RevalidatorHandle {
	fn drop(&mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
		}
	}
}
