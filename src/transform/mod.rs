mod path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub use path::JsonPath;

use crate::{
    mapping::Mapping,
    substitution::PathSource,
    topic::device_identifier,
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransformError {
    #[error("invalid path expression: {0}")]
    InvalidPath(String),
    #[error("{0} template is not valid JSON: {1}")]
    InvalidTemplate(String, String),
    #[error("cannot set key '{0}' on a value that is not an object")]
    NotAnObject(String),
    #[error("cannot set index {0} on a value that is not an array")]
    NotAnArray(usize),
    #[error("index {0} is beyond the end of an array of length {1}")]
    IndexOutOfRange(usize, usize),
}

/// Result of running a mapping against a sample payload.
#[derive(Debug, Serialize)]
pub struct Transformed {
    pub payload: Value,
    /// Source paths that produced no value.
    pub unresolved: Vec<String>,
}

fn parse_template(side: &str, text: &str) -> Result<Value, TransformError> {
    serde_json::from_str(text)
        .map_err(|e| TransformError::InvalidTemplate(side.to_string(), e.to_string()))
}

/// Applies the substitutions of `mapping` to `payload`, received on
/// `topic_sample`, producing the target payload.
pub fn apply(mapping: &Mapping, topic_sample: &str, payload: &Value) -> Result<Transformed, TransformError> {
    let mut target = parse_template("target", &mapping.target_template)?;
    let mut unresolved = Vec::new();

    for substitution in &mapping.substitutions {
        let extracted = match &substitution.path_source {
            PathSource::TopicDerivedIdentifier => {
                device_identifier(topic_sample, mapping.identifier_level).map(Value::String)
            }
            PathSource::Literal(path) => JsonPath::parse(path)?.get(payload).cloned(),
        };

        match extracted {
            Some(value) => {
                debug!(
                    source = %substitution.path_source,
                    target = %substitution.path_target,
                    %value,
                    "evaluated substitution"
                );
                JsonPath::parse(&substitution.path_target)?.set(&mut target, value)?;
            }
            None => {
                warn!(
                    mapping = %mapping.id,
                    source = %substitution.path_source,
                    "substitution source did not resolve"
                );
                unresolved.push(substitution.path_source.to_string());
            }
        }
    }

    Ok(Transformed {
        payload: target,
        unresolved,
    })
}

/// Runs `apply` with the mapping's own source template as payload.
pub fn apply_to_template(mapping: &Mapping, topic_sample: &str) -> Result<Transformed, TransformError> {
    let payload = parse_template("source", &mapping.source_template)?;
    apply(mapping, topic_sample, &payload)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::substitution::MappingSubstitution;

    fn temperature_mapping() -> Mapping {
        let mut mapping = Mapping::new("device/+/data");
        mapping.target_template =
            r#"{"source":{"id":"909090"},"c8y_T":{"T":{"value":0,"unit":"C"}},"type":"c8y_T"}"#.to_string();
        mapping.substitutions = vec![
            MappingSubstitution::identifier_from_topic(),
            MappingSubstitution::new("temp.value", "c8y_T.T.value", false).unwrap(),
        ];
        mapping
    }

    #[test]
    fn applies_substitutions() {
        let result = apply(&temperature_mapping(), "device/110/data", &json!({"temp": {"value": 21.5}})).unwrap();

        assert_eq!(result.payload["source"]["id"], json!("data"));
        assert_eq!(result.payload["c8y_T"]["T"]["value"], json!(21.5));
        assert_eq!(result.payload["c8y_T"]["T"]["unit"], json!("C"));
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn identifier_level_selects_topic_level() {
        let mut mapping = temperature_mapping();
        mapping.identifier_level = Some(1);
        let result = apply(&mapping, "device/110/data", &json!({})).unwrap();

        assert_eq!(result.payload["source"]["id"], json!("110"));
        assert_eq!(result.unresolved, vec!["temp.value".to_string()]);
    }

    #[test]
    fn broken_template_is_reported() {
        let mut mapping = temperature_mapping();
        mapping.target_template = "{".to_string();
        assert!(matches!(
            apply(&mapping, "device/110/data", &json!({})),
            Err(TransformError::InvalidTemplate(side, _)) if side == "target"
        ));
    }

    #[test]
    fn runs_against_source_template() {
        let mut mapping = temperature_mapping();
        mapping.source_template = r#"{"temp":{"value":3}}"#.to_string();
        let result = apply_to_template(&mapping, "device/7").unwrap();

        assert_eq!(result.payload["source"]["id"], json!("7"));
        assert_eq!(result.payload["c8y_T"]["T"]["value"], json!(3));
    }

    #[test]
    fn out_of_range_target_index_is_an_error() {
        let mut mapping = temperature_mapping();
        mapping.substitutions = vec![
            MappingSubstitution::new("temp.value", &format!("x[{}]", usize::MAX), false).unwrap(),
        ];
        let result = apply(&mapping, "device/110/data", &json!({"temp": {"value": 1}}));

        assert_eq!(result.err(), Some(TransformError::IndexOutOfRange(usize::MAX, 0)));
    }
}
