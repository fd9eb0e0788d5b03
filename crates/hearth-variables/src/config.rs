//! Variable definitions as persisted configuration
//!
//! Expression text round-trips as an opaque field; parsing happens when the
//! definition is installed into the manager.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One variable definition from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableConfig {
    /// Expression variable: `{"name": "c", "expression": "$a + $b"}`
    Expression { name: String, expression: String },

    /// Literal variable: `{"name": "a", "value": 5, "unit": "V"}`
    Value {
        name: String,
        value: ScalarConfig,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        unit: String,
    },
}

impl VariableConfig {
    /// The variable name this entry defines
    pub fn name(&self) -> &str {
        match self {
            VariableConfig::Expression { name, .. } => name,
            VariableConfig::Value { name, .. } => name,
        }
    }
}

/// A literal number or text in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarConfig {
    Number(f64),
    Text(String),
}

impl ScalarConfig {
    /// Combine with a unit string into a runtime [`Value`]
    pub fn into_value(self, unit: String) -> Value {
        match self {
            ScalarConfig::Number(value) => Value::Number { value, unit },
            ScalarConfig::Text(text) => Value::Text(text),
        }
    }
}

impl VariableConfig {
    /// Build a literal config entry from a runtime [`Value`]
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        let (value, unit) = match value {
            Value::Number { value, unit } => (ScalarConfig::Number(value), unit),
            Value::Text(text) => (ScalarConfig::Text(text), String::new()),
        };
        VariableConfig::Value {
            name: name.into(),
            value,
            unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let configs = vec![
            VariableConfig::Value {
                name: "a".to_string(),
                value: ScalarConfig::Number(5.0),
                unit: "V".to_string(),
            },
            VariableConfig::Expression {
                name: "c".to_string(),
                expression: "1*$a+10*$b".to_string(),
            },
        ];

        let json = serde_json::to_string(&configs).unwrap();
        let back: Vec<VariableConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, configs);
    }

    #[test]
    fn test_config_from_json_text() {
        let json = r#"[
            {"name": "greeting", "value": "hello"},
            {"name": "twice", "expression": "$greeting $greeting"}
        ]"#;

        let configs: Vec<VariableConfig> = serde_json::from_str(json).unwrap();
        assert_eq!(configs[0].name(), "greeting");
        assert!(matches!(&configs[1], VariableConfig::Expression { .. }));
    }
}
