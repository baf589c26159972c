//! Algorithm metadata and parameter validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Declared type of one configuration parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ParameterType {
    Int,
    Float,
    String,
    /// Anything this server does not know how to check.
    Unknown,
}

impl From<String> for ParameterType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "int" => Self::Int,
            "float" => Self::Float,
            "string" => Self::String,
            _ => Self::Unknown,
        }
    }
}

/// Schema entry for one parameter in an algorithm's `info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type", default)]
    pub param_type: Option<ParameterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Metadata describing one discovered algorithm.
///
/// `path` is the algorithm's directory, holding the `algorithm` executable;
/// it is filled by the scanner, never read from `info.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlgorithmInfo {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "type")]
    pub algorithm_type: String,
    pub supports_progress: bool,
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl AlgorithmInfo {
    /// Parse `info.json`, stamping `path` with the containing directory.
    pub fn from_info_file(info_path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(info_path)
            .map_err(|e| format!("cannot read {}: {e}", info_path.display()))?;
        let mut info: Self = serde_json::from_str(&text)
            .map_err(|e| format!("cannot parse {}: {e}", info_path.display()))?;
        info.path = info_path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        Ok(info)
    }

    /// Minimal metadata for a directory without an `info.json`.
    pub fn minimal(directory: &Path) -> Self {
        let name = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            display_name: name.clone(),
            description: format!("Algorithm: {name}"),
            version: "1.0.0".to_string(),
            path: directory.to_path_buf(),
            name,
            ..Self::default()
        }
    }

    pub fn executable_path(&self) -> PathBuf {
        self.path.join("algorithm")
    }

    /// An entry is usable iff it is named, displayable, and its executable
    /// exists as a regular file.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.display_name.is_empty()
            && !self.path.as_os_str().is_empty()
            && self.executable_path().is_file()
    }

    /// Check a run configuration against the declared parameter schema.
    ///
    /// Only keys both declared and present are checked: absent keys fall
    /// back to algorithm defaults, undeclared keys pass through untouched.
    /// Range checks apply only to numeric values (a type mismatch already
    /// produced its own error).
    pub fn validate_parameters(&self, config: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, spec) in &self.parameters {
            let Some(value) = config.get(name) else { continue };

            match spec.param_type {
                Some(ParameterType::Int) if value.as_i64().is_none() && value.as_u64().is_none() => {
                    errors.push(format!("Parameter '{name}' must be an integer"));
                }
                Some(ParameterType::Float) if !value.is_number() => {
                    errors.push(format!("Parameter '{name}' must be a number"));
                }
                Some(ParameterType::String) if !value.is_string() => {
                    errors.push(format!("Parameter '{name}' must be a string"));
                }
                _ => {}
            }

            if let Some(number) = value.as_f64() {
                if spec.min.is_some_and(|min| number < min) {
                    errors.push(format!("Parameter '{name}' is below minimum value"));
                }
                if spec.max.is_some_and(|max| number > max) {
                    errors.push(format!("Parameter '{name}' is above maximum value"));
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info_with_int_param() -> AlgorithmInfo {
        let mut info = AlgorithmInfo::default();
        info.parameters.insert(
            "p".to_string(),
            ParameterSpec {
                param_type: Some(ParameterType::Int),
                min: Some(1.0),
                max: Some(5.0),
                default: None,
            },
        );
        info
    }

    #[test]
    fn in_range_int_passes() {
        assert!(info_with_int_param().validate_parameters(&json!({"p": 3})).is_empty());
    }

    #[test]
    fn below_min_is_one_error() {
        let errors = info_with_int_param().validate_parameters(&json!({"p": 0}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("below minimum"));
    }

    #[test]
    fn above_max_is_one_error() {
        let errors = info_with_int_param().validate_parameters(&json!({"p": 6}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("above maximum"));
    }

    #[test]
    fn wrong_type_is_one_error() {
        let errors = info_with_int_param().validate_parameters(&json!({"p": "3"}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be an integer"));
    }

    #[test]
    fn float_value_is_not_an_integer() {
        let errors = info_with_int_param().validate_parameters(&json!({"p": 3.5}));
        assert!(errors.iter().any(|e| e.contains("must be an integer")));
    }

    #[test]
    fn absent_and_undeclared_keys_are_accepted() {
        let info = info_with_int_param();
        assert!(info.validate_parameters(&json!({})).is_empty());
        assert!(info.validate_parameters(&json!({"q": "whatever"})).is_empty());
    }

    #[test]
    fn float_and_string_parameters_check_their_types() {
        let mut info = AlgorithmInfo::default();
        info.parameters.insert(
            "rate".to_string(),
            ParameterSpec { param_type: Some(ParameterType::Float), min: None, max: None, default: None },
        );
        info.parameters.insert(
            "mode".to_string(),
            ParameterSpec { param_type: Some(ParameterType::String), min: None, max: None, default: None },
        );

        assert!(info.validate_parameters(&json!({"rate": 0.5, "mode": "fast"})).is_empty());
        // Integers are numbers too
        assert!(info.validate_parameters(&json!({"rate": 2})).is_empty());

        let errors = info.validate_parameters(&json!({"rate": "fast", "mode": 2}));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn unknown_declared_type_skips_type_check() {
        let spec: ParameterSpec = serde_json::from_value(json!({"type": "bool"})).unwrap();
        assert_eq!(spec.param_type, Some(ParameterType::Unknown));

        let mut info = AlgorithmInfo::default();
        info.parameters.insert("flag".to_string(), spec);
        assert!(info.validate_parameters(&json!({"flag": true})).is_empty());
    }

    #[test]
    fn info_json_parses_with_camel_case_fields() {
        let raw = json!({
            "name": "genetic",
            "displayName": "Genetic Optimizer",
            "version": "2.1",
            "description": "population search",
            "author": "planner",
            "type": "metaheuristic",
            "supportsProgress": true,
            "parameters": {
                "populationSize": {"type": "int", "min": 10, "max": 1000, "default": 100}
            }
        });

        let info: AlgorithmInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.name, "genetic");
        assert_eq!(info.display_name, "Genetic Optimizer");
        assert!(info.supports_progress);
        let spec = &info.parameters["populationSize"];
        assert_eq!(spec.param_type, Some(ParameterType::Int));
        assert_eq!(spec.min, Some(10.0));
        assert_eq!(spec.default, Some(json!(100)));
    }

    #[test]
    fn minimal_info_uses_directory_name() {
        let info = AlgorithmInfo::minimal(Path::new("/opt/algos/simple_test"));
        assert_eq!(info.name, "simple_test");
        assert_eq!(info.display_name, "simple_test");
        assert_eq!(info.description, "Algorithm: simple_test");
        assert_eq!(info.version, "1.0.0");
        assert!(!info.supports_progress);
    }

    #[test]
    fn validity_requires_name_and_executable() {
        // No executable on disk
        let info = AlgorithmInfo::minimal(Path::new("/nonexistent/algo"));
        assert!(!info.is_valid());

        let nameless = AlgorithmInfo::default();
        assert!(!nameless.is_valid());
    }
}
