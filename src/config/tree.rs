// ============================================================
// Layer 0 — Configuration Tree
// ============================================================
// A resolved configuration is a serde_yaml::Value mapping.
// serde_yaml keeps mapping keys in insertion order, so iterating
// `callbacks` or `logger` yields entries in the order they were
// written (and merged).
//
// Dotted paths address nested keys: "trainer.max_epochs".
// A segment that parses as an integer indexes into a sequence.

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use super::{ConfigError, TARGET_KEY};

/// The fully composed, resolved configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Parse a single YAML document. No composition or interpolation.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: "<inline>".to_string(),
            source,
        })?;
        Ok(Self::new(normalize_root(root)))
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn root(&self) -> ConfigNode<'_> {
        ConfigNode::new(String::new(), &self.root)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    pub fn node(&self, path: &str) -> Option<ConfigNode<'_>> {
        self.get(path).map(|value| ConfigNode::new(path.to_string(), value))
    }

    pub fn require(&self, path: &str) -> Result<ConfigNode<'_>, ConfigError> {
        match self.node(path) {
            Some(node) if !node.value().is_null() => Ok(node),
            _ => Err(ConfigError::MissingKey(path.to_string())),
        }
    }

    pub fn require_str(&self, path: &str) -> Result<&str, ConfigError> {
        self.require(path)?
            .value()
            .as_str()
            .ok_or_else(|| ConfigError::WrongType {
                key: path.to_string(),
                expected: "a string",
            })
    }

    /// Boolean switch: absent or null counts as `false`.
    pub fn flag(&self, path: &str) -> Result<bool, ConfigError> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ConfigError::WrongType {
                key: path.to_string(),
                expected: "a boolean",
            }),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        to_yaml(&self.root)
    }
}

/// A borrowed view of one sub-tree, remembering where it came from.
#[derive(Debug, Clone)]
pub struct ConfigNode<'a> {
    path:  String,
    value: &'a Value,
}

impl<'a> ConfigNode<'a> {
    pub fn new(path: String, value: &'a Value) -> Self {
        Self { path, value }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// The `_target_` of this node, if it is a mapping that carries one.
    pub fn target(&self) -> Option<&'a str> {
        self.value.as_mapping()?.get(TARGET_KEY)?.as_str()
    }

    /// Whether the node is a mapping with a `_target_` key, whatever its value.
    pub fn has_target_key(&self) -> bool {
        self.value
            .as_mapping()
            .is_some_and(|m| m.contains_key(TARGET_KEY))
    }

    /// Null, an empty mapping, or an empty sequence.
    pub fn is_empty(&self) -> bool {
        match self.value {
            Value::Null => true,
            Value::Mapping(m) => m.is_empty(),
            Value::Sequence(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn child(&self, key: &str) -> Option<ConfigNode<'a>> {
        let value = self.value.as_mapping()?.get(key)?;
        Some(ConfigNode::new(join_path(&self.path, key), value))
    }

    /// Mapping entries in insertion order. Non-mappings have no entries.
    pub fn entries(&self) -> Vec<(String, ConfigNode<'a>)> {
        let Some(mapping) = self.value.as_mapping() else {
            return Vec::new();
        };
        mapping
            .iter()
            .map(|(k, v)| {
                let key = key_to_string(k);
                let node = ConfigNode::new(join_path(&self.path, &key), v);
                (key, node)
            })
            .collect()
    }

    /// Deserialize the constructor arguments of this node: every key
    /// except `_target_`. A null node deserializes from an empty mapping.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let args = match self.value {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(m) => Value::Mapping(
                m.iter()
                    .filter(|(k, _)| k.as_str() != Some(TARGET_KEY))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => {
                return Err(ConfigError::WrongType {
                    key: self.path.clone(),
                    expected: "a mapping",
                })
            }
        };
        serde_yaml::from_value(args).map_err(|source| ConfigError::Args {
            path: self.path.clone(),
            source,
        })
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        to_yaml(self.value)
    }
}

// ─── Path helpers ─────────────────────────────────────────────────────────────

pub(crate) fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Mapping(m) => m.get(segment),
        Value::Sequence(s) => s.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Set `path` to `value`, creating intermediate mappings as needed.
pub(crate) fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::BadOverride(path.to_string()));
    }
    let Some((last, parents)) = segments.split_last() else {
        return Err(ConfigError::BadOverride(path.to_string()));
    };

    let mut node = root;
    for segment in parents {
        if node.is_null() {
            *node = Value::Mapping(Mapping::new());
        }
        node = match node {
            Value::Mapping(m) => m
                .entry(Value::String((*segment).to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new())),
            Value::Sequence(s) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| s.get_mut(i))
                .ok_or_else(|| ConfigError::MissingKey(path.to_string()))?,
            _ => {
                return Err(ConfigError::WrongType {
                    key: path.to_string(),
                    expected: "nested inside a mapping",
                })
            }
        };
    }

    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(m) => {
            m.insert(Value::String((*last).to_string()), value);
            Ok(())
        }
        Value::Sequence(s) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| s.get_mut(i))
                .ok_or_else(|| ConfigError::MissingKey(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(ConfigError::WrongType {
            key: path.to_string(),
            expected: "nested inside a mapping",
        }),
    }
}

/// Remove `path`. Returns whether anything was removed.
/// Mapping order of the remaining keys is preserved.
pub(crate) fn remove_path(root: &mut Value, path: &str) -> bool {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", path),
    };
    let parent = if parent_path.is_empty() {
        Some(root)
    } else {
        lookup_mut(root, parent_path)
    };
    let Some(Value::Mapping(m)) = parent else {
        return false;
    };
    if !m.contains_key(last) {
        return false;
    }
    let kept: Mapping = std::mem::take(m)
        .into_iter()
        .filter(|(k, _)| k.as_str() != Some(last))
        .collect();
    *m = kept;
    true
}

fn lookup_mut<'v>(root: &'v mut Value, path: &str) -> Option<&'v mut Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Mapping(m) => m.get_mut(segment),
        Value::Sequence(s) => s.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Deep-merge `overlay` into `base`. Mappings merge key by key;
/// anything else in `overlay` replaces what `base` had.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(b), Value::Mapping(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

pub(crate) fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

pub(crate) fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("{other:?}"),
    }
}

/// An empty file parses as null; treat it as an empty mapping.
pub(crate) fn normalize_root(root: Value) -> Value {
    if root.is_null() {
        Value::Mapping(Mapping::new())
    } else {
        root
    }
}

fn to_yaml(value: &Value) -> Result<String, ConfigError> {
    serde_yaml::to_string(value).map_err(|source| ConfigError::Parse {
        origin: "<serialize>".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn tree(text: &str) -> ConfigTree {
        ConfigTree::from_yaml_str(text).unwrap()
    }

    #[test]
    fn dotted_lookup_reaches_nested_and_sequence_values() {
        let cfg = tree("trainer:\n  max_epochs: 3\nsplits: [0.8, 0.2]\n");
        assert_eq!(cfg.get("trainer.max_epochs").and_then(Value::as_u64), Some(3));
        assert_eq!(cfg.get("splits.1").and_then(Value::as_f64), Some(0.2));
        assert!(cfg.get("trainer.missing").is_none());
    }

    #[test]
    fn flag_treats_absent_and_null_as_false() {
        let cfg = tree("train: true\ntest: null\n");
        assert!(cfg.flag("train").unwrap());
        assert!(!cfg.flag("test").unwrap());
        assert!(!cfg.flag("nothing").unwrap());
    }

    #[test]
    fn flag_rejects_non_boolean() {
        let cfg = tree("train: yes please\n");
        assert!(matches!(cfg.flag("train"), Err(ConfigError::WrongType { .. })));
    }

    #[test]
    fn entries_keep_insertion_order() {
        let cfg = tree("callbacks:\n  zeta: {}\n  alpha: {}\n  mid: {}\n");
        let keys: Vec<String> = cfg
            .node("callbacks")
            .unwrap()
            .entries()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn args_skip_target_key() {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Args {
            patience: usize,
        }
        let cfg = tree("early:\n  _target_: EarlyStopping\n  patience: 4\n");
        let node = cfg.node("early").unwrap();
        assert_eq!(node.target(), Some("EarlyStopping"));
        let args: Args = node.args().unwrap();
        assert_eq!(args.patience, 4);
    }

    #[test]
    fn merge_is_deep_and_overlay_wins() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: 2}\nb: 1\n").unwrap();
        let overlay: Value = serde_yaml::from_str("a: {y: 3, z: 4}\nb: [1]\n").unwrap();
        merge(&mut base, overlay);
        let expected: Value = serde_yaml::from_str("a: {x: 1, y: 3, z: 4}\nb: [1]\n").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn set_and_remove_paths() {
        let mut root: Value = serde_yaml::from_str("a: {b: 1, c: 2, d: 3}\n").unwrap();
        set_path(&mut root, "a.e.f", Value::Bool(true)).unwrap();
        assert_eq!(lookup(&root, "a.e.f"), Some(&Value::Bool(true)));

        assert!(remove_path(&mut root, "a.c"));
        assert!(!remove_path(&mut root, "a.c"));
        let keys: Vec<String> = root["a"]
            .as_mapping()
            .unwrap()
            .keys()
            .map(key_to_string)
            .collect();
        assert_eq!(keys, ["b", "d", "e"]);
    }
}
