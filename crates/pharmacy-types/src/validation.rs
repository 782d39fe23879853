//! Schema validation for implementation configuration tables.
//!
//! Each pluggable backend receives its own raw TOML table from
//! `<section>.implementations.<name>`. Backends describe the table they
//! accept with a [`Schema`] and reject bad configuration before start-up.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Expected type of a configuration field.
#[derive(Debug, Clone)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// An array whose elements all have the inner type.
	Array(Box<FieldType>),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Array(_) => "array",
		}
	}

	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = || ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: self.name(),
			actual: value.type_str().to_string(),
		};

		match self {
			FieldType::String => value.as_str().map(|_| ()).ok_or_else(mismatch),
			FieldType::Boolean => value.as_bool().map(|_| ()).ok_or_else(mismatch),
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(mismatch)?;
				if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
					return Err(ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!("{} is outside {:?}..={:?}", n, min, max),
					});
				}
				Ok(())
			},
			FieldType::Array(inner) => {
				let items = value.as_array().ok_or_else(mismatch)?;
				for (i, item) in items.iter().enumerate() {
					inner.check(&format!("{}[{}]", field, i), item)?;
				}
				Ok(())
			},
		}
	}
}

type FieldCheck = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A single field description.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	required: bool,
	check: Option<FieldCheck>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("required", &self.required)
			.finish()
	}
}

impl Field {
	pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			required: true,
			check: None,
		}
	}

	pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			required: false,
			..Self::required(name, field_type)
		}
	}

	/// Adds a value check run after the type check passes.
	pub fn with_check<F>(mut self, check: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.check = Some(Box::new(check));
		self
	}
}

/// Describes the table an implementation accepts.
///
/// Unknown keys are rejected so that typos surface at start-up.
#[derive(Debug, Default)]
pub struct Schema {
	fields: Vec<Field>,
}

impl Schema {
	pub fn new(fields: Vec<Field>) -> Self {
		Self { fields }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| ValidationError::TypeMismatch {
			field: "root".to_string(),
			expected: "table",
			actual: config.type_str().to_string(),
		})?;

		if let Some(unknown) = table
			.keys()
			.find(|key| !self.fields.iter().any(|f| &f.name == *key))
		{
			return Err(ValidationError::UnknownField(unknown.clone()));
		}

		for field in &self.fields {
			let Some(value) = table.get(&field.name) else {
				if field.required {
					return Err(ValidationError::MissingField(field.name.clone()));
				}
				continue;
			};

			field.field_type.check(&field.name, value)?;

			if let Some(check) = &field.check {
				check(value).map_err(|message| ValidationError::InvalidValue {
					field: field.name.clone(),
					message,
				})?;
			}
		}

		Ok(())
	}
}

/// Implemented by every backend to validate its configuration table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(vec![
			Field::required("storage_path", FieldType::String),
			Field::optional(
				"ttl_sessions",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			),
			Field::optional("tags", FieldType::Array(Box::new(FieldType::String))),
			Field::optional("base_url", FieldType::String).with_check(|v| {
				match v.as_str() {
					Some(s) if s.starts_with("http") => Ok(()),
					_ => Err("must be an http(s) URL".to_string()),
				}
			}),
		])
	}

	#[test]
	fn test_valid_table_passes() {
		let config: toml::Value = toml::from_str(
			r#"
storage_path = "./data"
ttl_sessions = 3600
tags = ["a", "b"]
base_url = "http://localhost"
"#,
		)
		.unwrap();
		assert!(schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str("ttl_sessions = 1").unwrap();
		assert_eq!(
			schema().validate(&config),
			Err(ValidationError::MissingField("storage_path".to_string()))
		);
	}

	#[test]
	fn test_bounds_and_types() {
		let negative: toml::Value =
			toml::from_str("storage_path = \"x\"\nttl_sessions = -1").unwrap();
		assert!(matches!(
			schema().validate(&negative),
			Err(ValidationError::InvalidValue { .. })
		));

		let bad_array: toml::Value = toml::from_str("storage_path = \"x\"\ntags = [1]").unwrap();
		assert!(matches!(
			schema().validate(&bad_array),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "tags[0]"
		));
	}

	#[test]
	fn test_custom_check_and_unknown_field() {
		let bad_url: toml::Value =
			toml::from_str("storage_path = \"x\"\nbase_url = \"ftp://x\"").unwrap();
		assert!(matches!(
			schema().validate(&bad_url),
			Err(ValidationError::InvalidValue { field, .. }) if field == "base_url"
		));

		let typo: toml::Value = toml::from_str("storage_pth = \"x\"").unwrap();
		assert_eq!(
			schema().validate(&typo),
			Err(ValidationError::UnknownField("storage_pth".to_string()))
		);
	}
}
