use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    mapping::Mapping,
    topic::{is_wildcard_topic, normalize_topic},
};

/// Reserved source token standing for the device identifier taken from the
/// topic the message arrived on.
pub const TOKEN_DEVICE_TOPIC: &str = "_DEVICE_IDENT_";

/// Target path that determines the identity of the target device.
pub const IDENTITY_TARGET_PATH: &str = "source.id";

pub const COLOR_PALETTE: [&str; 8] = [
    "#d5f4e6", "#80ced6", "#fefbd8", "#618685", "#ffef96", "#50394c", "#b2b2b2", "#f4e1d2",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("{0} path is missing")]
    MissingPath(PathSide),

    #[error("index {index} is out of range for {len} substitutions")]
    InvalidIndex { index: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSide {
    Source,
    Target,
}

impl fmt::Display for PathSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSide::Source => write!(f, "source"),
            PathSide::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PathSource {
    Literal(String),
    TopicDerivedIdentifier,
}

impl From<String> for PathSource {
    fn from(path: String) -> Self {
        if path == TOKEN_DEVICE_TOPIC {
            PathSource::TopicDerivedIdentifier
        } else {
            PathSource::Literal(path)
        }
    }
}

impl From<PathSource> for String {
    fn from(source: PathSource) -> Self {
        match source {
            PathSource::Literal(path) => path,
            PathSource::TopicDerivedIdentifier => TOKEN_DEVICE_TOPIC.to_string(),
        }
    }
}

impl fmt::Display for PathSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSource::Literal(path) => write!(f, "{}", path),
            PathSource::TopicDerivedIdentifier => write!(f, "{}", TOKEN_DEVICE_TOPIC),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSubstitution {
    pub path_source: PathSource,
    pub path_target: String,
    #[serde(default)]
    pub defines_identifier: bool,
}

impl MappingSubstitution {
    /// Builds a substitution from user input, rejecting blank paths.
    pub fn new(
        path_source: &str,
        path_target: &str,
        defines_identifier: bool,
    ) -> Result<Self, SubstitutionError> {
        let path_source = path_source.trim();
        let path_target = path_target.trim();
        if path_source.is_empty() {
            return Err(SubstitutionError::MissingPath(PathSide::Source));
        }
        if path_target.is_empty() {
            return Err(SubstitutionError::MissingPath(PathSide::Target));
        }

        Ok(MappingSubstitution {
            path_source: PathSource::from(path_source.to_string()),
            path_target: path_target.to_string(),
            defines_identifier,
        })
    }

    /// The substitution seeded for wildcard topics: topic tail to device id.
    pub fn identifier_from_topic() -> Self {
        MappingSubstitution {
            path_source: PathSource::TopicDerivedIdentifier,
            path_target: IDENTITY_TARGET_PATH.to_string(),
            defines_identifier: true,
        }
    }

    fn fragment(&self) -> String {
        let marker = if self.defines_identifier { "* " } else { "" };
        format!("[ {}{} -> {} ]", marker, self.path_source, self.path_target)
    }
}

/// Renders the substitution list as `[ src -> target ]` fragments, marking
/// the identifier-defining one with `* `.
pub fn summarize(substitutions: &[MappingSubstitution]) -> String {
    substitutions.iter().map(MappingSubstitution::fragment).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionChange {
    pub index: usize,
    pub color: &'static str,
}

/// Transient highlight state of the substitution list in the view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    cursor: usize,
    palette: usize,
    highlighted: Option<usize>,
}

impl Selection {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    fn reset(&mut self) {
        *self = Selection::default();
    }

    fn advance(&mut self, len: usize) -> Option<SelectionChange> {
        if len == 0 {
            self.reset();
            return None;
        }

        let color = COLOR_PALETTE[self.palette];
        self.palette = (self.palette + 1) % COLOR_PALETTE.len();

        let index = self.cursor.min(len - 1);
        self.highlighted = Some(index);
        self.cursor = index + 1;
        if self.cursor >= len {
            self.cursor = 0;
            self.palette = 0;
        }

        Some(SelectionChange { index, color })
    }
}

/// Edits the substitution list of one mapping and keeps its summary current.
#[derive(Debug, Clone)]
pub struct SubstitutionEditor {
    mapping: Mapping,
    selection: Selection,
    summary: String,
}

impl SubstitutionEditor {
    /// Starts editing `mapping`. A wildcard mapping without substitutions gets
    /// the topic identifier substitution seeded.
    pub fn open(mut mapping: Mapping) -> Self {
        if mapping.substitutions.is_empty() && is_wildcard_topic(&mapping.topic) {
            mapping
                .substitutions
                .push(MappingSubstitution::identifier_from_topic());
        }
        let summary = summarize(&mapping.substitutions);

        SubstitutionEditor {
            mapping,
            selection: Selection::default(),
            summary,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Marks the next level of the template topic as device identifier.
    pub fn mark_next_identifier_level(&mut self) -> Option<String> {
        self.mapping.next_identifier_level()
    }

    /// Loads the next snooped payload as source template.
    pub fn load_next_snooped_template(&mut self, counter: &mut usize) -> Option<&str> {
        self.mapping.next_snooped_template(counter)
    }

    pub fn into_mapping(self) -> Mapping {
        self.mapping
    }

    pub fn substitutions(&self) -> &[MappingSubstitution] {
        &self.mapping.substitutions
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn summarize(&mut self) -> &str {
        self.summary = summarize(&self.mapping.substitutions);
        &self.summary
    }

    pub fn add(&mut self, mut substitution: MappingSubstitution) {
        if substitution.path_target == IDENTITY_TARGET_PATH {
            substitution.defines_identifier = true;
        }
        if substitution.defines_identifier {
            for existing in self.mapping.substitutions.iter_mut() {
                existing.defines_identifier = false;
            }
        }
        debug!(
            mapping = %self.mapping.id,
            source = %substitution.path_source,
            target = %substitution.path_target,
            "adding substitution"
        );
        self.mapping.substitutions.push(substitution);
        self.summarize();
    }

    /// Empties the list, re-seeding the identifier substitution for wildcard
    /// topics.
    pub fn clear(&mut self) {
        self.mapping.substitutions.clear();
        self.selection.reset();
        if is_wildcard_topic(&self.mapping.topic) {
            self.add(MappingSubstitution::identifier_from_topic());
        } else {
            self.summarize();
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<MappingSubstitution, SubstitutionError> {
        let len = self.mapping.substitutions.len();
        if index >= len {
            return Err(SubstitutionError::InvalidIndex { index, len });
        }
        let removed = self.mapping.substitutions.remove(index);
        self.selection.reset();
        self.summarize();

        Ok(removed)
    }

    /// Removes the substitution highlighted last by `cycle_select`.
    pub fn remove_selected(&mut self) -> Result<MappingSubstitution, SubstitutionError> {
        match self.selection.highlighted {
            Some(index) => self.remove_at(index),
            None => Err(SubstitutionError::InvalidIndex {
                index: self.selection.cursor,
                len: self.mapping.substitutions.len(),
            }),
        }
    }

    pub fn cycle_select(&mut self) -> Option<SelectionChange> {
        self.selection.advance(self.mapping.substitutions.len())
    }

    /// Replaces the topic. The template topic follows it, and the identifier
    /// level and substitutions derived from the old topic are dropped.
    pub fn change_topic(&mut self, topic: &str) {
        let topic = normalize_topic(topic);
        self.mapping.template_topic = topic.clone();
        self.mapping.topic = topic;
        self.mapping.identifier_level = None;
        self.clear();
    }
}
