//! Broadcast channel carrying [`PharmacyEvent`]s between components.
//!
//! Publishing never blocks. Slow subscribers may lag and miss events; the
//! revalidation scheduler treats a lag as a reason to refresh.

use pharmacy_types::PharmacyEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PharmacyEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PharmacyEvent> {
		self.sender.subscribe()
	}

	/// Sends an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed, which callers may ignore.
	pub fn publish(
		&self,
		event: PharmacyEvent,
	) -> Result<usize, broadcast::error::SendError<PharmacyEvent>> {
		self.sender.send(event)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
