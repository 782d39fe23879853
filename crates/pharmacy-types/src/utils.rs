//! Small helpers shared across crates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Shortens an identifier for logs and list rows.
///
/// Keeps the first 8 characters of longer ids.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Current Unix time in seconds.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
