//! Start-up and shutdown steps for the engine.

use super::{EngineError, PharmacyEngine};

impl PharmacyEngine {
	/// Seeds the catalog from configuration.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(app_id = %self.config.app.id, "Initializing pharmacy engine");

		self.catalog
			.seed(&self.config.catalog.products)
			.await
			.map_err(|e| EngineError::Service(format!("Failed to seed catalog: {}", e)))?;

		Ok(())
	}

	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down pharmacy engine");
		Ok(())
	}
}
