use thiserror::Error;

pub const SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Level value used when deriving a concrete sample topic from a pattern.
pub const SAMPLE_LEVEL: &str = "value";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic sample has {sample} levels, topic has {topic}")]
    LevelCountMismatch { topic: usize, sample: usize },

    #[error("level {level} of topic sample is '{found}', expected '{expected}'")]
    StructureMismatch {
        level: usize,
        expected: String,
        found: String,
    },
}

/// Returns true if any level of the topic is the single-level wildcard.
pub fn is_wildcard_topic(topic: &str) -> bool {
    topic.split(SEPARATOR).any(|level| level == SINGLE_LEVEL_WILDCARD)
}

/// Canonical form of a topic: trimmed, runs of separators collapsed and no
/// trailing separator. A topic consisting of a single separator is kept.
pub fn normalize_topic(topic: &str) -> String {
    let mut normalized = String::with_capacity(topic.len());
    let mut previous_separator = false;
    for c in topic.trim().chars() {
        if c == SEPARATOR {
            if !previous_separator {
                normalized.push(c);
            }
            previous_separator = true;
        } else {
            normalized.push(c);
            previous_separator = false;
        }
    }
    if normalized.len() > 1 && normalized.ends_with(SEPARATOR) {
        normalized.pop();
    }
    normalized
}

/// Levels of the normalized topic. A leading separator yields an empty first
/// level.
pub fn split_levels(topic: &str) -> Vec<String> {
    normalize_topic(topic)
        .split(SEPARATOR)
        .map(String::from)
        .collect()
}

pub fn derive_sample_topic(topic: &str) -> String {
    split_levels(topic)
        .into_iter()
        .map(|level| {
            if level == SINGLE_LEVEL_WILDCARD || level == MULTI_LEVEL_WILDCARD {
                SAMPLE_LEVEL.to_string()
            } else {
                level
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks that `sample` is a concrete instance of the `topic` pattern.
pub fn validate_topic_sample(topic: &str, sample: &str) -> Result<(), TopicError> {
    let pattern = split_levels(topic);
    let concrete = split_levels(sample);

    let open_ended = pattern.last().is_some_and(|l| l == MULTI_LEVEL_WILDCARD);
    let fixed = if open_ended { pattern.len() - 1 } else { pattern.len() };
    if (open_ended && concrete.len() < fixed) || (!open_ended && concrete.len() != fixed) {
        return Err(TopicError::LevelCountMismatch {
            topic: pattern.len(),
            sample: concrete.len(),
        });
    }

    for (level, (expected, found)) in pattern.iter().zip(concrete.iter()).take(fixed).enumerate() {
        if expected != SINGLE_LEVEL_WILDCARD && expected != found {
            return Err(TopicError::StructureMismatch {
                level,
                expected: expected.clone(),
                found: found.clone(),
            });
        }
    }

    Ok(())
}

/// Value of the device identifier carried in a concrete topic. Without an
/// explicit level the last level is used.
pub fn device_identifier(sample: &str, level: Option<usize>) -> Option<String> {
    let levels = split_levels(sample);
    let index = match level {
        Some(index) => index,
        None => levels.len().checked_sub(1)?,
    };
    levels.get(index).filter(|l| !l.is_empty()).cloned()
}
