#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// Closed model of a preference value. Objects are kept sorted by key, which
/// is the order the integrity serializer emits them in.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<PrefValue>),
    Object(BTreeMap<String, PrefValue>),
}

impl PrefValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PrefValue::Null)
    }

    /// Null, `[]` and `{}`.
    pub fn is_empty_container(&self) -> bool {
        match self {
            PrefValue::Null => true,
            PrefValue::Array(items) => items.is_empty(),
            PrefValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PrefValue::Null => Value::Null,
            PrefValue::Bool(b) => Value::Bool(*b),
            PrefValue::Int(i) => Value::from(*i),
            PrefValue::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            PrefValue::String(s) => Value::String(s.clone()),
            PrefValue::Array(items) => Value::Array(items.iter().map(PrefValue::to_json).collect()),
            PrefValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<&Value> for PrefValue {
    /// Integers that fit in 32 bits stay integers; every other number is a
    /// double, as in the browser's own value model.
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => PrefValue::Null,
            Value::Bool(b) => PrefValue::Bool(*b),
            Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => PrefValue::Int(i),
                None => PrefValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => PrefValue::String(s.clone()),
            Value::Array(items) => PrefValue::Array(items.iter().map(PrefValue::from).collect()),
            Value::Object(map) => PrefValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), PrefValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for PrefValue {
    fn from(value: Value) -> Self {
        PrefValue::from(&value)
    }
}

impl From<&str> for PrefValue {
    fn from(s: &str) -> Self {
        PrefValue::String(s.to_owned())
    }
}

impl From<bool> for PrefValue {
    fn from(b: bool) -> Self {
        PrefValue::Bool(b)
    }
}

impl From<i32> for PrefValue {
    fn from(i: i32) -> Self {
        PrefValue::Int(i)
    }
}

/// Sorts object keys and drops object members that are null or empty
/// containers, after canonicalizing them. Array elements keep their position.
pub fn canonicalize(value: &PrefValue) -> PrefValue {
    match value {
        PrefValue::Object(map) => PrefValue::Object(
            map.iter()
                .filter_map(|(k, v)| {
                    let v = canonicalize(v);
                    (!v.is_empty_container()).then(|| (k.clone(), v))
                })
                .collect(),
        ),
        PrefValue::Array(items) => PrefValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Follows a dotted path through nested objects. Segments containing a
/// literal dot cannot be addressed.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, segment| node.get(segment))
}

/// Writes `value` at a dotted path, creating intermediate objects and
/// replacing non-object intermediates.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    insert_at(doc, &segments, value);
}

fn insert_at(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*first).to_owned()).or_insert(Value::Null);
        insert_at(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_split_on_i32_range() {
        assert_eq!(PrefValue::from(&json!(7)), PrefValue::Int(7));
        assert_eq!(PrefValue::from(&json!(-2147483648i64)), PrefValue::Int(i32::MIN));
        assert_eq!(PrefValue::from(&json!(2147483648i64)), PrefValue::Double(2147483648.0));
        assert_eq!(PrefValue::from(&json!(1.5)), PrefValue::Double(1.5));
        assert_eq!(PrefValue::from(&json!(1.0)), PrefValue::Double(1.0));
    }

    #[test]
    fn canonicalize_prunes_empty_members_recursively() {
        let v = PrefValue::from(&json!({
            "b": {"inner": {}, "gone": null},
            "a": [null, [], {}],
            "c": 1,
        }));
        let expected = PrefValue::from(&json!({
            "a": [null, [], {}],
            "c": 1,
        }));
        assert_eq!(canonicalize(&v), expected);
    }

    #[test]
    fn canonicalize_keeps_top_level_empty_containers() {
        assert_eq!(canonicalize(&PrefValue::Array(vec![])), PrefValue::Array(vec![]));
        assert_eq!(canonicalize(&PrefValue::Null), PrefValue::Null);
    }

    #[test]
    fn lookup_and_set_follow_dotted_paths() {
        let mut doc = json!({"browser": {"show_home_button": true}});
        assert_eq!(lookup(&doc, "browser.show_home_button"), Some(&json!(true)));
        assert_eq!(lookup(&doc, "browser.missing"), None);
        assert_eq!(lookup(&doc, "browser.show_home_button.deeper"), None);

        set_path(&mut doc, "homepage.url", json!("about:blank"));
        set_path(&mut doc, "browser.show_home_button", json!(false));
        assert_eq!(
            doc,
            json!({
                "browser": {"show_home_button": false},
                "homepage": {"url": "about:blank"},
            })
        );
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let src = json!({"k": [1, 2.5, "s", true, null]});
        assert_eq!(PrefValue::from(&src).to_json(), src);
    }
}
