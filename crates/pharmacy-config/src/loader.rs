//! Multi-file configuration loading.
//!
//! Included files may themselves include further files. Each file is read
//! once; reading a file twice is reported as a circular include. Top-level
//! sections are merged, and a section defined in two files is an error.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read.
	loaded_files: HashSet<PathBuf>,
	/// Section name to the file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and everything it includes into one validated config.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let mut merged = toml::map::Map::new();
		let mut pending = vec![self.resolve_path(config_path.as_ref())?];

		while let Some(path) = pending.pop() {
			let mut table = self.load_table(&path).await?;

			for include in extract_includes(&mut table)?.into_iter().rev() {
				pending.push(self.resolve_path(&include)?);
			}

			for (section, value) in table {
				if let Some(existing) = self.section_sources.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}",
						section,
						existing.display(),
						path.display()
					)));
				}
				tracing::debug!(section = %section, file = %path.display(), "Loaded config section");
				self.section_sources.insert(section.clone(), path.clone());
				merged.insert(section, value);
			}
		}

		let combined = toml::to_string(&toml::Value::Table(merged))
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize combined config: {}", e)))?;
		combined.parse()
	}

	/// Reads one file, resolving environment references.
	async fn load_table(&mut self, path: &Path) -> Result<toml::map::Map<String, toml::Value>, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(&canonical).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn resolve_path(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

/// Removes and returns the `include` directive of a file.
fn extract_includes(
	table: &mut toml::map::Map<String, toml::Value>,
) -> Result<Vec<PathBuf>, ConfigError> {
	match table.remove("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const APP: &str = "[app]\nid = \"test-pharmacy\"\n";

	const STORAGE: &str = r#"
[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	const SERVICES: &str = r#"
[auth]
primary = "local"
[auth.implementations.local]

[media]
primary = "memory"
signing_secret = "0123456789abcdef0123"
[media.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("config.toml"), crate::MINIMAL_CONFIG).unwrap();

		let config = ConfigLoader::new(dir.path())
			.load_config("config.toml")
			.await
			.unwrap();
		assert_eq!(config.app.id, "test-pharmacy");
	}

	#[tokio::test]
	async fn test_nested_includes() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = [\"storage.toml\"]\n{}", APP),
		)
		.unwrap();
		fs::write(
			dir.path().join("storage.toml"),
			format!("include = \"services.toml\"\n{}", STORAGE),
		)
		.unwrap();
		fs::write(dir.path().join("services.toml"), SERVICES).unwrap();

		let config = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap();
		assert_eq!(config.storage.primary, "memory");
		assert_eq!(config.auth.primary, "local");
		assert_eq!(config.media.primary, "memory");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = [\"dup.toml\"]\n{}{}{}", APP, STORAGE, SERVICES),
		)
		.unwrap();
		fs::write(dir.path().join("dup.toml"), "[app]\nid = \"other\"\n").unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'app'"));
	}

	#[tokio::test]
	async fn test_circular_include_detection() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("a.toml"),
			format!("include = [\"b.toml\"]\n{}", APP),
		)
		.unwrap();
		fs::write(dir.path().join("b.toml"), "include = [\"a.toml\"]\n").unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("a.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("main.toml"), "include = \"nope.toml\"\n").unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}
}
