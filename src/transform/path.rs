use serde_json::{Map, Value};

use super::TransformError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// A path into a JSON document such as `c8y_Temperature.T.value` or
/// `readings[2].value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath(Vec<Step>);

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, TransformError> {
        let invalid = || TransformError::InvalidPath(path.to_string());
        let mut steps = Vec::new();

        for segment in path.split('.') {
            let (key, mut rest) = match segment.find('[') {
                Some(open) => segment.split_at(open),
                None => (segment, ""),
            };
            if key.is_empty() && (rest.is_empty() || steps.is_empty()) {
                return Err(invalid());
            }
            if !key.is_empty() {
                steps.push(Step::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(invalid)?;
                if !rest.starts_with('[') {
                    return Err(invalid());
                }
                let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
                steps.push(Step::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(JsonPath(steps))
    }

    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(value, |current, step| match step {
            Step::Key(key) => current.get(key.as_str()),
            Step::Index(index) => current.get(*index),
        })
    }

    /// Writes `new` at the path, creating objects for missing keys. An index
    /// may address an existing element or append one at the end of the array.
    pub fn set(&self, value: &mut Value, new: Value) -> Result<(), TransformError> {
        let mut current = value;
        for step in &self.0 {
            current = match step {
                Step::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(|| TransformError::NotAnObject(key.clone()))?
                        .entry(key.clone())
                        .or_insert(Value::Null)
                }
                Step::Index(index) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    let array = current
                        .as_array_mut()
                        .ok_or_else(|| TransformError::NotAnArray(*index))?;
                    if *index > array.len() {
                        return Err(TransformError::IndexOutOfRange(*index, array.len()));
                    }
                    if *index == array.len() {
                        array.push(Value::Null);
                    }
                    &mut array[*index]
                }
            };
        }
        *current = new;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_keys_and_indices() {
        assert_eq!(
            JsonPath::parse("readings[2].value").unwrap(),
            JsonPath(vec![
                Step::Key("readings".to_string()),
                Step::Index(2),
                Step::Key("value".to_string()),
            ])
        );
        assert!(JsonPath::parse("a..b").is_err());
        assert!(JsonPath::parse("a[x]").is_err());
        assert!(JsonPath::parse("a[1").is_err());
        assert!(JsonPath::parse("").is_err());
    }

    #[test]
    fn get_and_set() {
        let source = json!({"readings": [{"value": 1}, {"value": 2}]});
        let path = JsonPath::parse("readings[1].value").unwrap();
        assert_eq!(path.get(&source), Some(&json!(2)));

        let mut target = json!({"source": {"id": "909090"}});
        JsonPath::parse("source.id").unwrap().set(&mut target, json!("110")).unwrap();
        JsonPath::parse("c8y_T.T.value").unwrap().set(&mut target, json!(21.5)).unwrap();
        assert_eq!(target, json!({"source": {"id": "110"}, "c8y_T": {"T": {"value": 21.5}}}));
    }

    #[test]
    fn set_appends_but_does_not_pad() {
        let mut target = json!({"readings": [1]});
        JsonPath::parse("readings[1]").unwrap().set(&mut target, json!(2)).unwrap();
        JsonPath::parse("fresh[0].v").unwrap().set(&mut target, json!(3)).unwrap();
        assert_eq!(target, json!({"readings": [1, 2], "fresh": [{"v": 3}]}));

        assert_eq!(
            JsonPath::parse("readings[5]").unwrap().set(&mut target, json!(6)),
            Err(TransformError::IndexOutOfRange(5, 2))
        );
        let huge = format!("x[{}]", usize::MAX);
        assert_eq!(
            JsonPath::parse(&huge).unwrap().set(&mut target, json!(1)),
            Err(TransformError::IndexOutOfRange(usize::MAX, 0))
        );
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut target = json!({"type": "x"});
        assert!(JsonPath::parse("type.name").unwrap().set(&mut target, json!(1)).is_err());
    }
}
