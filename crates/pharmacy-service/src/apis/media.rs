//! Serving objects behind signed URLs.

use super::media_error;
use pharmacy_core::PharmacyEngine;
use pharmacy_media::MediaObject;
use pharmacy_types::APIError;

/// Verifies the signature, then downloads the object.
pub async fn fetch_signed(
	engine: &PharmacyEngine,
	bucket: &str,
	key: &str,
	expires: u64,
	signature: &str,
) -> Result<MediaObject, APIError> {
	let media = engine.media();
	if let Err(e) = media.verify_signed_url(bucket, key, expires, signature) {
		tracing::debug!(bucket, error = %e, "Rejected media request");
		return Err(media_error(e));
	}
	media.download(bucket, key).await.map_err(media_error)
}
