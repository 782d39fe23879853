//! Read-only product catalog.

use pharmacy_config::ProductSeed;
use pharmacy_storage::{OrderBy, StorageError, StorageService};
use pharmacy_types::{Collection, Product};
use std::sync::Arc;

pub struct CatalogService {
	storage: Arc<StorageService>,
}

impl CatalogService {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Lists products by name. A failed read yields an empty catalog.
	pub async fn list_products(&self) -> Vec<Product> {
		match self
			.storage
			.list(Collection::Products, None, Some(&OrderBy::asc("name")))
			.await
		{
			Ok(products) => products,
			Err(e) => {
				tracing::warn!(error = %e, "Failed to load catalog, showing no products");
				Vec::new()
			},
		}
	}

	/// Inserts configured products that are not stored yet.
	///
	/// Existing products are left untouched. Returns how many were added.
	pub async fn seed(&self, seeds: &[ProductSeed]) -> Result<usize, StorageError> {
		let mut added = 0;
		for seed in seeds {
			let product = Product {
				id: seed.id.clone(),
				name: seed.name.clone(),
				description: seed.description.clone(),
				price: seed.price,
				image_ref: seed.image_ref.clone(),
				requires_prescription: seed.requires_prescription,
			};
			match self
				.storage
				.insert(Collection::Products, &product.id, &product)
				.await
			{
				Ok(()) => added += 1,
				Err(StorageError::AlreadyExists(_)) => {},
				Err(e) => return Err(e),
			}
		}
		if added > 0 {
			tracing::info!(added, "Seeded catalog products");
		}
		Ok(added)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::FlakyStorage;
	use pharmacy_storage::implementations::memory::MemoryStorage;
	use rust_decimal::Decimal;
	use std::str::FromStr;

	fn seed(id: &str, name: &str, price: &str) -> ProductSeed {
		ProductSeed {
			id: id.to_string(),
			name: name.to_string(),
			description: String::new(),
			price: Decimal::from_str(price).unwrap(),
			image_ref: None,
			requires_prescription: false,
		}
	}

	#[tokio::test]
	async fn test_seed_is_insert_if_absent() {
		let catalog = CatalogService::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))));
		let seeds = vec![seed("p2", "Paracetamol", "3.50"), seed("p1", "Aspirin", "4.20")];

		assert_eq!(catalog.seed(&seeds).await.unwrap(), 2);
		assert_eq!(catalog.seed(&seeds).await.unwrap(), 0);

		let products = catalog.list_products().await;
		let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
		assert_eq!(names, vec!["Aspirin", "Paracetamol"]);
		assert_eq!(products[0].price, Decimal::from_str("4.20").unwrap());
	}

	#[tokio::test]
	async fn test_read_failure_degrades_to_empty() {
		let storage = FlakyStorage::new();
		let failing = storage.failure_switch();
		let catalog = CatalogService::new(Arc::new(StorageService::new(Box::new(storage))));
		catalog.seed(&[seed("p1", "Aspirin", "4.20")]).await.unwrap();

		failing.fail_reads(true);
		assert!(catalog.list_products().await.is_empty());
	}
}
