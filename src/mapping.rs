use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    substitution::MappingSubstitution,
    topic::{normalize_topic, split_levels},
};

/// Source template of a freshly created mapping.
pub const EMPTY_TEMPLATE: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Api {
    #[default]
    Measurement,
    Event,
    Alarm,
    Inventory,
    Operation,
}

impl Api {
    pub const ALL: [Api; 5] = [
        Api::Measurement,
        Api::Event,
        Api::Alarm,
        Api::Inventory,
        Api::Operation,
    ];

    /// Target payload offered as a starting point for a new mapping.
    pub fn sample_template(&self) -> &'static str {
        match self {
            Api::Measurement => {
                r#"{"c8y_TemperatureMeasurement":{"T":{"value":110,"unit":"C"}},"time":"2022-08-05T00:14:49.389+02:00","source":{"id":"909090"},"type":"c8y_TemperatureMeasurement"}"#
            }
            Api::Event => {
                r#"{"source":{"id":"909090"},"text":"This is a new test event","time":"2022-08-05T00:14:49.389+02:00","type":"c8y_TestEvent"}"#
            }
            Api::Alarm => {
                r#"{"source":{"id":"909090"},"type":"c8y_TestAlarm","text":"This is a new test alarm!","severity":"MAJOR","status":"ACTIVE","time":"2022-08-05T00:14:49.389+02:00"}"#
            }
            Api::Inventory => r#"{"c8y_IsDevice":{},"name":"Vibration Sensor","type":"maker_Vibration_Sensor"}"#,
            Api::Operation => {
                r#"{"deviceId":"909090","description":"New camera operation!","type":"maker_Vibration_Sensor"}"#
            }
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Api::Measurement => "measurement",
            Api::Event => "event",
            Api::Alarm => "alarm",
            Api::Inventory => "inventory",
            Api::Operation => "operation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnoopStatus {
    #[default]
    None,
    Enabled,
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub template_topic: String,
    #[serde(default)]
    pub target_api: Api,
    #[serde(default)]
    pub qos: Qos,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub create_non_existing_device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_type: Option<String>,
    #[serde(default)]
    pub snoop_status: SnoopStatus,
    #[serde(default)]
    pub snooped_templates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_level: Option<usize>,
    #[serde(default = "empty_template")]
    pub source_template: String,
    #[serde(default = "empty_template")]
    pub target_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(default)]
    pub substitutions: Vec<MappingSubstitution>,
}

fn empty_template() -> String {
    EMPTY_TEMPLATE.to_string()
}

impl Mapping {
    pub fn new(topic: &str) -> Self {
        let topic = normalize_topic(topic);
        let target_api = Api::default();
        Mapping {
            id: String::new(),
            name: String::new(),
            template_topic: topic.clone(),
            topic,
            target_api,
            qos: Qos::default(),
            active: false,
            create_non_existing_device: false,
            external_id_type: None,
            snoop_status: SnoopStatus::default(),
            snooped_templates: Vec::new(),
            identifier_level: None,
            source_template: empty_template(),
            target_template: target_api.sample_template().to_string(),
            last_update: None,
            substitutions: Vec::new(),
        }
    }

    /// Moves the marked device identifier to the next level of the template
    /// topic, wrapping to the first level. Returns the marked level value.
    pub fn next_identifier_level(&mut self) -> Option<String> {
        let levels = split_levels(&self.template_topic);
        let next = match self.identifier_level {
            Some(level) if level + 1 < levels.len() => level + 1,
            _ => 0,
        };
        self.identifier_level = Some(next);
        levels.get(next).cloned()
    }

    /// Loads the next snooped payload as source template and stops snooping.
    pub fn next_snooped_template(&mut self, counter: &mut usize) -> Option<&str> {
        if self.snooped_templates.is_empty() {
            return None;
        }
        if *counter >= self.snooped_templates.len() {
            *counter = 0;
        }
        self.source_template = self.snooped_templates[*counter].clone();
        self.snoop_status = SnoopStatus::Stopped;
        *counter += 1;
        Some(&self.source_template)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationError {
    #[error("topic is empty")]
    TopicMissing,

    #[error("topic '{0}' is already used by another mapping")]
    TopicNotUnique(String),

    #[error("template topic '{0}' is already used by another mapping")]
    TemplateTopicNotUnique(String),

    #[error("template topic '{template_topic}' must start with topic '{topic}'")]
    TemplateTopicMustMatchTopic {
        topic: String,
        template_topic: String,
    },

    #[error("{0} template is not valid JSON")]
    TemplateNotJson(String),

    #[error("{0} substitutions define the device identifier, at most one may")]
    MultipleIdentifiers(usize),
}

fn others<'a>(id: &'a str, mappings: &'a [Mapping]) -> impl Iterator<Item = &'a Mapping> + 'a {
    mappings.iter().filter(move |m| m.id != id)
}

pub fn is_topic_unique(topic: &str, id: &str, mappings: &[Mapping]) -> bool {
    let topic = normalize_topic(topic);
    others(id, mappings).all(|m| normalize_topic(&m.topic) != topic)
}

pub fn is_template_topic_unique(template_topic: &str, id: &str, mappings: &[Mapping]) -> bool {
    let template_topic = normalize_topic(template_topic);
    others(id, mappings).all(|m| normalize_topic(&m.template_topic) != template_topic)
}

pub fn is_template_topic_valid(template_topic: &str, topic: &str) -> bool {
    normalize_topic(template_topic).starts_with(&normalize_topic(topic))
}

/// Checks `candidate` on its own and against every other mapping.
pub fn validate(candidate: &Mapping, mappings: &[Mapping]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if normalize_topic(&candidate.topic).is_empty() {
        errors.push(ValidationError::TopicMissing);
    } else if !is_topic_unique(&candidate.topic, &candidate.id, mappings) {
        errors.push(ValidationError::TopicNotUnique(normalize_topic(&candidate.topic)));
    }

    if !is_template_topic_unique(&candidate.template_topic, &candidate.id, mappings) {
        errors.push(ValidationError::TemplateTopicNotUnique(normalize_topic(
            &candidate.template_topic,
        )));
    }
    if !is_template_topic_valid(&candidate.template_topic, &candidate.topic) {
        errors.push(ValidationError::TemplateTopicMustMatchTopic {
            topic: normalize_topic(&candidate.topic),
            template_topic: normalize_topic(&candidate.template_topic),
        });
    }

    for (side, template) in [
        ("source", &candidate.source_template),
        ("target", &candidate.target_template),
    ] {
        if serde_json::from_str::<serde_json::Value>(template).is_err() {
            errors.push(ValidationError::TemplateNotJson(side.to_string()));
        }
    }

    let identifiers = candidate
        .substitutions
        .iter()
        .filter(|s| s.defines_identifier)
        .count();
    if identifiers > 1 {
        errors.push(ValidationError::MultipleIdentifiers(identifiers));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(id: &str, topic: &str) -> Mapping {
        let mut mapping = Mapping::new(topic);
        mapping.id = id.to_string();
        mapping
    }

    #[test]
    fn trailing_separator_is_duplicate() {
        let mappings = vec![mapping("1", "device/110")];
        assert!(!is_topic_unique("device/110/", "2", &mappings));
        assert!(is_topic_unique("device/110/", "1", &mappings));
        assert!(is_topic_unique("device/111", "2", &mappings));
    }

    #[test]
    fn template_topic_uniqueness() {
        let mut existing = mapping("1", "device/+");
        existing.template_topic = "device/+/east".to_string();
        let mappings = vec![existing];
        assert!(!is_template_topic_unique("device//+/east/", "2", &mappings));
        assert!(is_template_topic_unique("device/+/west", "2", &mappings));
    }

    #[test]
    fn template_topic_prefix() {
        assert!(is_template_topic_valid("device/110/sub", "device/110"));
        assert!(!is_template_topic_valid("other/110", "device/110"));
    }

    #[test]
    fn validate_collects_errors() {
        let mappings = vec![mapping("1", "device/110")];
        let mut candidate = mapping("2", "device/110/");
        candidate.template_topic = "other/110".to_string();
        candidate.source_template = "{".to_string();

        let errors = validate(&candidate, &mappings);
        assert_eq!(
            errors,
            vec![
                ValidationError::TopicNotUnique("device/110".to_string()),
                ValidationError::TemplateTopicMustMatchTopic {
                    topic: "device/110".to_string(),
                    template_topic: "other/110".to_string(),
                },
                ValidationError::TemplateNotJson("source".to_string()),
            ]
        );
    }

    #[test]
    fn fresh_mapping_is_valid() {
        let candidate = mapping("2", "device/+/data");
        assert!(validate(&candidate, &[mapping("1", "device/110")]).is_empty());
    }

    #[test]
    fn identifier_level_cycles() {
        let mut m = mapping("1", "device/+/data");
        m.template_topic = "device/110/data".to_string();
        assert_eq!(m.next_identifier_level(), Some("device".to_string()));
        assert_eq!(m.next_identifier_level(), Some("110".to_string()));
        assert_eq!(m.next_identifier_level(), Some("data".to_string()));
        assert_eq!(m.next_identifier_level(), Some("device".to_string()));
    }

    #[test]
    fn snooped_templates_cycle_and_stop() {
        let mut m = mapping("1", "device/110");
        let mut counter = 0;
        assert_eq!(m.next_snooped_template(&mut counter), None);

        m.snoop_status = SnoopStatus::Started;
        m.snooped_templates = vec![r#"{"a":1}"#.to_string(), r#"{"b":2}"#.to_string()];
        assert_eq!(m.next_snooped_template(&mut counter), Some(r#"{"a":1}"#));
        assert_eq!(m.next_snooped_template(&mut counter), Some(r#"{"b":2}"#));
        assert_eq!(m.next_snooped_template(&mut counter), Some(r#"{"a":1}"#));
        assert_eq!(m.snoop_status, SnoopStatus::Stopped);
    }
}
