//! Typed bag over provisioning outputs.

use crate::errors::ProvisioningError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared outputs of an applied module.
///
/// Accessors fail with `OutputMissing` or `OutputType` instead of coercing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs {
    values: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

impl Outputs {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the document printed by `terraform output -json`.
    ///
    /// Each top-level key maps to `{"sensitive": .., "type": .., "value": ..}`;
    /// only `value` is kept.
    pub fn from_terraform_json(json: &str) -> Result<Self, ProvisioningError> {
        let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(json)
            .map_err(|e| ProvisioningError::OutputParse(e.to_string()))?;
        Ok(Self {
            values: entries.into_iter().map(|(k, e)| (k, e.value)).collect(),
        })
    }

    /// Sets an output value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value.
    pub fn raw(&self, key: &str) -> Result<&serde_json::Value, ProvisioningError> {
        self.values
            .get(key)
            .ok_or_else(|| ProvisioningError::output_missing(key))
    }

    /// Returns a string output.
    pub fn string(&self, key: &str) -> Result<String, ProvisioningError> {
        let value = self.raw(key)?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| type_error(key, "string", value))
    }

    /// Returns an integer output.
    pub fn int(&self, key: &str) -> Result<i64, ProvisioningError> {
        let value = self.raw(key)?;
        value.as_i64().ok_or_else(|| type_error(key, "integer", value))
    }

    /// Returns a boolean output.
    pub fn bool(&self, key: &str) -> Result<bool, ProvisioningError> {
        let value = self.raw(key)?;
        value.as_bool().ok_or_else(|| type_error(key, "boolean", value))
    }

    /// Returns a list-of-strings output.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, ProvisioningError> {
        let value = self.raw(key)?;
        let items = value
            .as_array()
            .ok_or_else(|| type_error(key, "list of strings", value))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(String::from)
                    .ok_or_else(|| type_error(key, "list of strings", value))
            })
            .collect()
    }

    /// Returns true if the output is declared.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the declared output names.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

fn type_error(key: &str, expected: &'static str, actual: &serde_json::Value) -> ProvisioningError {
    ProvisioningError::OutputType {
        key: key.to_string(),
        expected,
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "instance_name": {"sensitive": false, "type": "string", "value": "mysql-test-abc123"},
        "port": {"sensitive": false, "type": "number", "value": 3306},
        "ha": {"sensitive": false, "type": "bool", "value": false},
        "ips": {"sensitive": false, "type": ["list", "string"], "value": ["10.0.0.1", "10.0.0.2"]}
    }"#;

    #[test]
    fn test_parse_terraform_json() {
        let outputs = Outputs::from_terraform_json(DOC).unwrap();

        assert_eq!(outputs.string("instance_name").unwrap(), "mysql-test-abc123");
        assert_eq!(outputs.int("port").unwrap(), 3306);
        assert!(!outputs.bool("ha").unwrap());
        assert_eq!(outputs.string_list("ips").unwrap(), vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(outputs.keys(), vec!["ha", "instance_name", "ips", "port"]);
    }

    #[test]
    fn test_missing_output() {
        let outputs = Outputs::new();
        let err = outputs.string("public_ip").unwrap_err();
        assert!(matches!(err, ProvisioningError::OutputMissing { ref key } if key == "public_ip"));
    }

    #[test]
    fn test_type_mismatch_is_explicit() {
        let outputs = Outputs::from_terraform_json(DOC).unwrap();

        let err = outputs.string("port").unwrap_err();
        assert!(matches!(err, ProvisioningError::OutputType { expected: "string", .. }));
        assert!(outputs.int("instance_name").is_err());
        assert!(outputs.string_list("instance_name").is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = Outputs::from_terraform_json("not json").unwrap_err();
        assert!(matches!(err, ProvisioningError::OutputParse(_)));
    }

    #[test]
    fn test_builder() {
        let outputs = Outputs::new().with("db_name", "testdb");
        assert!(outputs.contains("db_name"));
        assert_eq!(outputs.string("db_name").unwrap(), "testdb");
    }
}
