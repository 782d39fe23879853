//! Terminal view of the staff dashboard.
//!
//! Signs in, then reloads the dashboard on a timer and whenever an order
//! event is published, logging the rows after each reload.

use async_trait::async_trait;
use pharmacy_core::monitoring::{EventScheduler, IntervalScheduler, Revalidator};
use pharmacy_core::{PharmacyEngine, Refresh, StaffDashboard, ViewError};
use pharmacy_types::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// Logs the dashboard rows after each reload.
struct LoggedDashboard {
	dashboard: StaffDashboard,
}

#[async_trait]
impl Refresh for LoggedDashboard {
	fn name(&self) -> &'static str {
		"staff_dashboard"
	}

	async fn refresh(&self) -> Result<(), ViewError> {
		self.dashboard.refresh().await?;
		let rows = self.dashboard.rows().await;
		tracing::info!(count = rows.len(), "Dashboard");
		for row in rows {
			let actions: Vec<&str> = row
				.actions
				.iter()
				.flat_map(|set| set.iter())
				.map(|action| action.as_str())
				.collect();
			tracing::info!(
				order_id = %row.short_id,
				status = %row.badge.label,
				prescription = row.has_prescription,
				actions = ?actions,
				"{}",
				row.notes
			);
		}
		Ok(())
	}
}

pub async fn run(
	engine: Arc<PharmacyEngine>,
	email: &str,
	password: SecretString,
) -> Result<(), Box<dyn std::error::Error>> {
	let context = Arc::new(engine.new_context());
	let session = context.sign_in(email, &password).await?;
	if !session.is_staff() {
		context.sign_out().await;
		return Err(ViewError::NotStaff.into());
	}

	let view = Arc::new(LoggedDashboard {
		dashboard: StaffDashboard::new(context.clone(), engine.orders().clone()),
	});

	let period = Duration::from_secs(engine.config().app.refresh_interval_seconds);
	let polling = Revalidator::spawn(view.clone(), IntervalScheduler::new(period));
	let pushed = Revalidator::spawn(view, EventScheduler::new(engine.event_bus()));

	engine.run().await?;

	polling.stop().await;
	pushed.stop().await;
	context.sign_out().await;
	Ok(())
}
