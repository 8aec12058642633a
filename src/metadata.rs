//! Step metadata carried in `STEP` directive comments.
//!
//! The body after the marker is YAML. Recognized keys are enumerated here with
//! their defaults; unknown keys are ignored rather than stored.
use crate::annotation::AnnotationError;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::BTreeMap;

fn default_return_code() -> Option<i32> {
    Some(0)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepMetadata {
    #[serde(default, deserialize_with = "scalar_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub background: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sleep: f64,
    #[serde(default, deserialize_with = "scalar_list")]
    pub expected_stdout_lines: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub expected_stderr_lines: Vec<String>,
    /// `None` when the document explicitly asks for the code to go unchecked.
    #[serde(default = "default_return_code", deserialize_with = "explicit_null")]
    pub expected_return_code: Option<i32>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub manual_pause_message: Option<String>,
    #[serde(default)]
    pub output_match_mode: Option<String>,
    #[serde(default)]
    pub match_order: Option<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub tags: Vec<String>,
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            background: false,
            sleep: 0.0,
            expected_stdout_lines: Vec::new(),
            expected_stderr_lines: Vec::new(),
            expected_return_code: default_return_code(),
            working_dir: None,
            timeout_seconds: None,
            env: BTreeMap::new(),
            manual_pause_message: None,
            output_match_mode: None,
            match_order: None,
            tags: Vec::new(),
        }
    }
}

impl StepMetadata {
    /// Parse the YAML body that follows a `STEP` marker.
    pub fn parse(body: &str) -> Result<Self, AnnotationError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(body)
            .map_err(|err| AnnotationError::InvalidMetadata(err.to_string()))?;
        if value.is_null() {
            return Ok(Self::default());
        }
        if !value.is_mapping() {
            return Err(AnnotationError::InvalidMetadata(
                "step metadata must be a mapping of keys to values".to_string(),
            ));
        }
        let metadata: Self = serde_yaml::from_value(value)
            .map_err(|err| AnnotationError::InvalidMetadata(err.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), AnnotationError> {
        if !self.sleep.is_finite() || self.sleep < 0.0 {
            return Err(AnnotationError::InvalidMetadata("sleep must be >= 0".to_string()));
        }
        if let Some(timeout_seconds) = self.timeout_seconds {
            if !timeout_seconds.is_finite() || timeout_seconds < 0.0 {
                return Err(AnnotationError::InvalidMetadata(
                    "timeout_seconds must be >= 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i32>::deserialize(deserializer)
}

fn scalar_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(value) => scalar_to_string(value).map_err(serde::de::Error::custom),
    }
}

fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<Value> = null_as_default(deserializer)?;
    values
        .into_iter()
        .map(|value| scalar_to_string(value).map_err(serde::de::Error::custom))
        .collect()
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: BTreeMap<String, Value> = null_as_default(deserializer)?;
    values
        .into_iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|value| (key, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

/// YAML happily reads `- 200` as an integer; expectations are always text.
fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected a scalar value, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_uses_defaults() {
        let metadata = StepMetadata::parse("\n").expect("parse");
        assert_eq!(metadata, StepMetadata::default());
        assert_eq!(metadata.expected_return_code, Some(0));
    }

    #[test]
    fn explicit_null_return_code_disables_check() {
        let metadata =
            StepMetadata::parse("\nname: ignore\nexpected_return_code:\n").expect("parse");
        assert_eq!(metadata.expected_return_code, None);

        let metadata = StepMetadata::parse("expected_return_code: 15").expect("parse");
        assert_eq!(metadata.expected_return_code, Some(15));
    }

    #[test]
    fn recognized_keys_are_parsed() {
        let body = r#"
name: full
background: true
sleep: 1.5
expected_stdout_lines:
  - test
  - 200
expected_stderr_lines:
working_dir: ./foo
timeout_seconds: 5
env:
  ENVA: foo
  PORT: 8080
manual_pause_message: "Stop Here"
output_match_mode: substring
match_order: none
tags:
  - foo
unknown_key: ignored
"#;
        let metadata = StepMetadata::parse(body).expect("parse");
        assert_eq!(metadata.name, "full");
        assert!(metadata.background);
        assert_eq!(metadata.sleep, 1.5);
        assert_eq!(metadata.expected_stdout_lines, vec!["test", "200"]);
        assert!(metadata.expected_stderr_lines.is_empty());
        assert_eq!(metadata.working_dir.as_deref(), Some("./foo"));
        assert_eq!(metadata.timeout_seconds, Some(5.0));
        assert_eq!(metadata.env.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(metadata.manual_pause_message.as_deref(), Some("Stop Here"));
        assert_eq!(metadata.output_match_mode.as_deref(), Some("substring"));
        assert_eq!(metadata.match_order.as_deref(), Some("none"));
        assert_eq!(metadata.tags, vec!["foo"]);
    }

    #[test]
    fn indented_body_is_accepted() {
        let body = "\n    name: indented\n    match_order: sequential\n    expected_stdout_lines:\n    - 'line 1'\n";
        let metadata = StepMetadata::parse(body).expect("parse");
        assert_eq!(metadata.name, "indented");
        assert_eq!(metadata.expected_stdout_lines, vec!["line 1"]);
    }

    #[test]
    fn malformed_yaml_is_an_annotation_error() {
        let err = StepMetadata::parse("name: [unclosed").expect_err("should fail");
        assert!(matches!(err, AnnotationError::InvalidMetadata(_)));

        let err = StepMetadata::parse("just a sentence").expect_err("should fail");
        assert!(matches!(err, AnnotationError::InvalidMetadata(_)));
    }

    #[test]
    fn negative_sleep_is_rejected() {
        let err = StepMetadata::parse("sleep: -1").expect_err("should fail");
        assert!(matches!(err, AnnotationError::InvalidMetadata(_)));
    }
}
