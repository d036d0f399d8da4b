#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::prefs::error::{PrefsError, PrefsResult};
use crate::prefs::value::PrefValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacNode {
    Leaf(String),
    Branch(MacTree),
}

/// Codes keyed by dotted preference path, nested one level per segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacTree {
    nodes: BTreeMap<String, MacNode>,
}

impl MacTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &BTreeMap<String, MacNode> {
        &self.nodes
    }

    pub fn insert(&mut self, path: &str, code: impl Into<String>) -> PrefsResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        insert_segments(&mut self.nodes, &segments, code.into(), path)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        let mut nodes = &self.nodes;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (nodes.get(segment)?, segments.peek()) {
                (MacNode::Leaf(code), None) => return Some(code),
                (MacNode::Branch(child), Some(_)) => nodes = &child.nodes,
                _ => return None,
            }
        }
        None
    }

    /// Dotted path to code for every leaf.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        flatten_into(&self.nodes, "", &mut out);
        out
    }

    /// Value the super code is computed over.
    pub fn to_value(&self) -> PrefValue {
        PrefValue::Object(
            self.nodes
                .iter()
                .map(|(k, node)| {
                    let v = match node {
                        MacNode::Leaf(code) => PrefValue::String(code.clone()),
                        MacNode::Branch(child) => child.to_value(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.nodes
                .iter()
                .map(|(k, node)| {
                    let v = match node {
                        MacNode::Leaf(code) => Value::String(code.clone()),
                        MacNode::Branch(child) => child.to_json(),
                    };
                    (k.clone(), v)
                })
                .collect::<Map<_, _>>(),
        )
    }

    /// Reads a nested `{segment: code | {...}}` object.
    pub fn from_json(value: &Value) -> PrefsResult<Self> {
        let Value::Object(map) = value else {
            return Err(PrefsError::InvalidStore("mac tree is not an object".into()));
        };
        let mut nodes = BTreeMap::new();
        for (k, v) in map {
            let node = match v {
                Value::String(code) => MacNode::Leaf(code.clone()),
                Value::Object(_) => MacNode::Branch(Self::from_json(v)?),
                other => {
                    return Err(PrefsError::InvalidStore(format!(
                        "mac entry {k:?} is neither a code nor a subtree: {other}"
                    )))
                }
            };
            nodes.insert(k.clone(), node);
        }
        Ok(Self { nodes })
    }
}

fn insert_segments(
    nodes: &mut BTreeMap<String, MacNode>,
    segments: &[&str],
    code: String,
    path: &str,
) -> PrefsResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(PrefsError::PathConflict(path.to_owned()));
    };
    if rest.is_empty() {
        if let Some(MacNode::Branch(_)) = nodes.get(*first) {
            return Err(PrefsError::PathConflict(path.to_owned()));
        }
        nodes.insert((*first).to_owned(), MacNode::Leaf(code));
        return Ok(());
    }
    match nodes
        .entry((*first).to_owned())
        .or_insert_with(|| MacNode::Branch(MacTree::new()))
    {
        MacNode::Branch(child) => insert_segments(&mut child.nodes, rest, code, path),
        MacNode::Leaf(_) => Err(PrefsError::PathConflict(path.to_owned())),
    }
}

fn flatten_into(nodes: &BTreeMap<String, MacNode>, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (k, node) in nodes {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match node {
            MacNode::Leaf(code) => {
                out.insert(path, code.clone());
            }
            MacNode::Branch(child) => flatten_into(&child.nodes, &path, out),
        }
    }
}

/// Nests a flat `path -> code` map by dotted segments.
pub fn build_tree<'a, I>(flat: I) -> PrefsResult<MacTree>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut tree = MacTree::new();
    for (path, code) in flat {
        tree.insert(path, code.as_str())?;
    }
    Ok(tree)
}

pub fn flatten(tree: &MacTree) -> BTreeMap<String, String> {
    tree.flatten()
}
