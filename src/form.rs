use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::{
    mapping::{Api, Mapping, Qos, SnoopStatus},
    topic::normalize_topic,
};

/// Values of the mapping property form as submitted by the browser.
/// Unchecked checkboxes are absent from the submission.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MappingForm {
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
    pub active: Option<String>,
    #[serde(default)]
    pub create_non_existing_device: Option<String>,
    #[serde(default)]
    pub external_id_type: String,
    #[serde(default)]
    pub snoop_templates: Option<String>,
    #[serde(default)]
    pub source_template: String,
    #[serde(default)]
    pub target_template: String,
}

fn checkbox(checked: bool) -> Option<String> {
    checked.then(|| "on".to_string())
}

impl MappingForm {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        MappingForm {
            name: mapping.name.clone(),
            topic: mapping.topic.clone(),
            template_topic: mapping.template_topic.clone(),
            target_api: mapping.target_api,
            qos: mapping.qos,
            active: checkbox(mapping.active),
            create_non_existing_device: checkbox(mapping.create_non_existing_device),
            external_id_type: mapping.external_id_type.clone().unwrap_or_default(),
            snoop_templates: checkbox(mapping.snoop_status != SnoopStatus::None),
            source_template: mapping.source_template.clone(),
            target_template: mapping.target_template.clone(),
        }
    }

    /// Snapshot of `current` with the form values applied. Substitutions,
    /// snooped templates and the identifier level are owned by the editor
    /// and carried over from `current`.
    pub fn commit(&self, current: &Mapping) -> Mapping {
        let topic = normalize_topic(&self.topic);
        let template_topic = if self.template_topic.trim().is_empty() {
            topic.clone()
        } else {
            normalize_topic(&self.template_topic)
        };
        let snoop_status = match (self.snoop_templates.is_some(), current.snoop_status) {
            (false, _) => SnoopStatus::None,
            (true, SnoopStatus::None) => SnoopStatus::Enabled,
            (true, status) => status,
        };
        let external_id_type = Some(self.external_id_type.trim())
            .filter(|s| !s.is_empty())
            .map(String::from);
        let source_template = if self.source_template.trim().is_empty() {
            current.source_template.clone()
        } else {
            self.source_template.clone()
        };
        let target_template = if self.target_template.trim().is_empty() {
            self.target_api.sample_template().to_string()
        } else {
            self.target_template.clone()
        };

        Mapping {
            id: current.id.clone(),
            name: self.name.trim().to_string(),
            topic,
            template_topic,
            target_api: self.target_api,
            qos: self.qos,
            active: self.active.is_some(),
            create_non_existing_device: self.create_non_existing_device.is_some(),
            external_id_type,
            snoop_status,
            snooped_templates: current.snooped_templates.clone(),
            identifier_level: current.identifier_level,
            source_template,
            target_template,
            last_update: Some(Local::now().to_rfc3339()),
            substitutions: current.substitutions.clone(),
        }
    }
}
