// ============================================================
// Layer 0 — Config Composition
// ============================================================
// A primary config (configs/train.yaml) lists what it is built from:
//
//   defaults:
//     - _self_
//     - data: dogbreed          → configs/data/dogbreed.yaml under `data`
//     - model: image_classifier → configs/model/image_classifier.yaml under `model`
//     - callbacks: default
//     - logger: null            → group left out
//     - paths                   → configs/paths.yaml merged at the root
//
// Entries merge in list order; `_self_` marks where the file's own
// keys go (end of the list when omitted). Group files may have their
// own `defaults` naming other options of the same group, which lets
// `trainer/gpu.yaml` extend `trainer/default.yaml`.
//
// Composition steps:
//   1. split overrides into group selections and value overrides
//   2. merge the defaults list of the primary file
//   3. apply value overrides
//   4. resolve interpolations

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::interpolate;
use super::overrides::Override;
use super::tree::{key_to_string, merge, normalize_root, set_path, ConfigTree};
use super::ConfigError;

const DEFAULTS_KEY: &str = "defaults";
const SELF_ENTRY: &str = "_self_";
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum DefaultEntry {
    SelfRef,
    Include(String),
    Group { group: String, option: Option<String> },
}

/// Loads and composes configuration files from one directory.
#[derive(Debug, Clone)]
pub struct Composer {
    config_dir: PathBuf,
}

impl Composer {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self { config_dir: config_dir.into() }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Compose `<config_dir>/<config_name>.yaml` with `overrides` applied
    /// and every interpolation resolved.
    pub fn compose(&self, config_name: &str, overrides: &[String]) -> Result<ConfigTree, ConfigError> {
        let parsed = overrides
            .iter()
            .map(|raw| Override::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let (group_choices, value_overrides): (Vec<Override>, Vec<Override>) =
            parsed.into_iter().partition(|o| self.is_group(o.key()));

        let mut root = self.compose_primary(config_name, &group_choices)?;
        for o in &value_overrides {
            o.apply(&mut root)?;
        }

        let resolved = interpolate::resolve(&root)?;
        tracing::debug!(
            "Composed '{}' from '{}' with {} override(s)",
            config_name,
            self.config_dir.display(),
            overrides.len()
        );
        Ok(ConfigTree::new(resolved))
    }

    fn is_group(&self, key: &str) -> bool {
        !key.contains('.') && self.config_dir.join(key).is_dir()
    }

    fn compose_primary(&self, name: &str, group_choices: &[Override]) -> Result<Value, ConfigError> {
        let path = self.file_path(None, name);
        let (own, mut entries) = self.load_with_defaults(&path, true)?;

        for choice in group_choices {
            apply_group_choice(&mut entries, choice)?;
        }

        let mut merged = Value::Mapping(Mapping::new());
        let mut own = Some(own);
        for entry in entries {
            match entry {
                DefaultEntry::SelfRef => {
                    if let Some(own) = own.take() {
                        merge(&mut merged, own);
                    }
                }
                DefaultEntry::Include(include) => {
                    let value = self.compose_group_file(None, &include, 1)?;
                    merge(&mut merged, value);
                }
                DefaultEntry::Group { group, option: Some(option) } => {
                    let value = self.compose_group_file(Some(&group), &option, 1)?;
                    let mut packaged = Value::Mapping(Mapping::new());
                    set_path(&mut packaged, &group, value)?;
                    merge(&mut merged, packaged);
                }
                DefaultEntry::Group { option: None, .. } => {}
            }
        }
        Ok(merged)
    }

    /// A group (or root-level include) file, with its own same-group defaults.
    fn compose_group_file(&self, group: Option<&str>, name: &str, depth: usize) -> Result<Value, ConfigError> {
        if depth > MAX_DEPTH {
            return Err(ConfigError::IncludeDepth(MAX_DEPTH));
        }
        let path = self.file_path(group, name);
        if !path.is_file() {
            if let Some(group) = group {
                return Err(ConfigError::MissingGroupOption {
                    group: group.to_string(),
                    option: name.to_string(),
                    path,
                });
            }
        }
        let (own, entries) = self.load_with_defaults(&path, false)?;

        let mut merged = Value::Mapping(Mapping::new());
        let mut own = Some(own);
        for entry in entries {
            match entry {
                DefaultEntry::SelfRef => {
                    if let Some(own) = own.take() {
                        merge(&mut merged, own);
                    }
                }
                DefaultEntry::Include(sibling) => {
                    merge(&mut merged, self.compose_group_file(group, &sibling, depth + 1)?);
                }
                DefaultEntry::Group { group: nested, .. } => {
                    return Err(ConfigError::BadDefaults {
                        origin: path.display().to_string(),
                        detail: format!("group files cannot select group '{nested}'"),
                    })
                }
            }
        }
        Ok(merged)
    }

    /// Read a file, split off its `defaults` list, and make sure `_self_`
    /// appears exactly once.
    fn load_with_defaults(&self, path: &Path, primary: bool) -> Result<(Value, Vec<DefaultEntry>), ConfigError> {
        let mut value = load_yaml(path)?;
        let origin = path.display().to_string();

        let defaults = match value.as_mapping_mut() {
            Some(m) => {
                let raw = m.get(DEFAULTS_KEY).cloned();
                if raw.is_some() {
                    let kept: Mapping = std::mem::take(m)
                        .into_iter()
                        .filter(|(k, _)| k.as_str() != Some(DEFAULTS_KEY))
                        .collect();
                    *m = kept;
                }
                raw
            }
            None => {
                return Err(ConfigError::WrongType {
                    key: origin,
                    expected: "a mapping at the top level",
                })
            }
        };

        let mut entries = match defaults {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| parse_entry(item, primary, &origin))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ConfigError::BadDefaults {
                    origin,
                    detail: "`defaults` must be a list".to_string(),
                })
            }
        };

        if !entries.contains(&DefaultEntry::SelfRef) {
            entries.push(DefaultEntry::SelfRef);
        }
        Ok((value, entries))
    }

    fn file_path(&self, group: Option<&str>, name: &str) -> PathBuf {
        let file = format!("{}.yaml", name.trim_end_matches(".yaml"));
        match group {
            Some(group) => self.config_dir.join(group).join(file),
            None => self.config_dir.join(file),
        }
    }
}

fn load_yaml(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        origin: path.display().to_string(),
        source,
    })?;
    Ok(normalize_root(value))
}

fn parse_entry(item: &Value, primary: bool, origin: &str) -> Result<DefaultEntry, ConfigError> {
    let bad = |detail: &str| ConfigError::BadDefaults {
        origin: origin.to_string(),
        detail: detail.to_string(),
    };
    match item {
        Value::String(s) if s == SELF_ENTRY => Ok(DefaultEntry::SelfRef),
        Value::String(s) => Ok(DefaultEntry::Include(s.clone())),
        Value::Mapping(m) if primary && m.len() == 1 => {
            let (group, option) = m.iter().next().ok_or_else(|| bad("empty entry"))?;
            let option = match option {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                _ => return Err(bad("group option must be a name or null")),
            };
            Ok(DefaultEntry::Group { group: key_to_string(group), option })
        }
        Value::Mapping(_) if !primary => Err(bad("group files may only list options of their own group")),
        _ => Err(bad("entries are `_self_`, a file name, or `group: option`")),
    }
}

fn apply_group_choice(entries: &mut Vec<DefaultEntry>, choice: &Override) -> Result<(), ConfigError> {
    let position = |group: &str, entries: &[DefaultEntry]| {
        entries
            .iter()
            .position(|e| matches!(e, DefaultEntry::Group { group: g, .. } if g == group))
    };

    match choice {
        Override::Set { key, value } => {
            let idx = position(key, entries).ok_or_else(|| ConfigError::UnknownGroup(key.clone()))?;
            entries[idx] = DefaultEntry::Group { group: key.clone(), option: option_name(key, value)? };
        }
        Override::Add { key, value } => {
            if position(key, entries).is_some() {
                return Err(ConfigError::DuplicateKey(key.clone()));
            }
            entries.push(DefaultEntry::Group { group: key.clone(), option: option_name(key, value)? });
        }
        Override::Delete { key } => {
            let idx = position(key, entries).ok_or_else(|| ConfigError::UnknownGroup(key.clone()))?;
            entries.remove(idx);
        }
    }
    Ok(())
}

fn option_name(group: &str, value: &Value) -> Result<Option<String>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ConfigError::WrongType {
            key: group.to_string(),
            expected: "a config group option name",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "train.yaml",
            "defaults:\n  - _self_\n  - paths\n  - model: small\n  - trainer: default\n  - logger: null\n\
             train: true\ntest: false\nseed: 1\n",
        );
        write(root, "paths.yaml", "paths:\n  root_dir: /runs\n  log_dir: ${paths.root_dir}/logs\n");
        write(root, "model/small.yaml", "_target_: ImageClassifier\nnum_classes: 3\nhidden_size: 16\n");
        write(root, "model/large.yaml", "_target_: ImageClassifier\nnum_classes: 3\nhidden_size: 512\n");
        write(root, "trainer/default.yaml", "_target_: Trainer\nmax_epochs: 10\naccelerator: cpu\n");
        write(root, "trainer/gpu.yaml", "defaults:\n  - default\naccelerator: gpu\n");
        write(root, "logger/csv.yaml", "csv:\n  _target_: CsvLogger\n  save_dir: ${paths.log_dir}\n");
        dir
    }

    #[test]
    fn composes_groups_includes_and_interpolations() {
        let dir = fixture();
        let cfg = Composer::new(dir.path()).compose("train", &[]).unwrap();

        assert_eq!(cfg.require_str("model._target_").unwrap(), "ImageClassifier");
        assert_eq!(cfg.get("model.hidden_size").and_then(Value::as_u64), Some(16));
        assert_eq!(cfg.require_str("paths.log_dir").unwrap(), "/runs/logs");
        assert!(cfg.get("logger").is_none());
        assert!(cfg.get("defaults").is_none());
        assert!(cfg.flag("train").unwrap());
    }

    #[test]
    fn group_override_selects_other_option() {
        let dir = fixture();
        let cfg = Composer::new(dir.path())
            .compose("train", &["model=large".to_string()])
            .unwrap();
        assert_eq!(cfg.get("model.hidden_size").and_then(Value::as_u64), Some(512));
    }

    #[test]
    fn group_file_extends_sibling() {
        let dir = fixture();
        let cfg = Composer::new(dir.path())
            .compose("train", &["trainer=gpu".to_string()])
            .unwrap();
        assert_eq!(cfg.require_str("trainer.accelerator").unwrap(), "gpu");
        assert_eq!(cfg.get("trainer.max_epochs").and_then(Value::as_u64), Some(10));
    }

    #[test]
    fn null_group_can_be_enabled_and_value_overrides_apply() {
        let dir = fixture();
        let overrides = vec![
            "logger=csv".to_string(),
            "trainer.max_epochs=2".to_string(),
            "+extra.note=hello".to_string(),
        ];
        let cfg = Composer::new(dir.path()).compose("train", &overrides).unwrap();
        assert_eq!(cfg.require_str("logger.csv.save_dir").unwrap(), "/runs/logs");
        assert_eq!(cfg.get("trainer.max_epochs").and_then(Value::as_u64), Some(2));
        assert_eq!(cfg.require_str("extra.note").unwrap(), "hello");
    }

    #[test]
    fn self_first_lets_defaults_win() {
        let dir = fixture();
        write(dir.path(), "model/seeded.yaml", "_target_: ImageClassifier\nnum_classes: 3\n");
        write(
            dir.path(),
            "order.yaml",
            "defaults:\n  - _self_\n  - model: seeded\nmodel:\n  num_classes: 99\n",
        );
        let cfg = Composer::new(dir.path()).compose("order", &[]).unwrap();
        assert_eq!(cfg.get("model.num_classes").and_then(Value::as_u64), Some(3));
    }

    #[test]
    fn unknown_group_option_is_reported() {
        let dir = fixture();
        let err = Composer::new(dir.path())
            .compose("train", &["model=missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingGroupOption { .. }));
    }

    #[test]
    fn missing_primary_file_is_a_read_error() {
        let dir = fixture();
        let err = Composer::new(dir.path()).compose("nope", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
