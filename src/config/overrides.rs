// ============================================================
// Layer 0 — Command-line Overrides
// ============================================================
// Syntax accepted after the subcommand:
//
//   trainer.max_epochs=5     set an existing key
//   +trainer.seed=7          add a key that does not exist yet
//   ~logger.csv              delete a key
//   model=small_cnn          pick another option of a config group
//
// Whether `name=value` selects a group option or sets a value is
// decided by the composer, which knows the config directory.
// Values are parsed as YAML, so `5`, `true`, `[1, 2]` and `null`
// keep their types; anything unparsable stays a string.

use serde_yaml::Value;

use super::tree::{lookup, remove_path, set_path};
use super::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    Set { key: String, value: Value },
    Add { key: String, value: Value },
    Delete { key: String },
}

impl Override {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let bad = || ConfigError::BadOverride(raw.to_string());

        if let Some(rest) = raw.strip_prefix('~') {
            // `~key=value` deletes too; the value is ignored.
            let key = rest.split_once('=').map_or(rest, |(k, _)| k).trim();
            if !valid_key(key) {
                return Err(bad());
            }
            return Ok(Override::Delete { key: key.to_string() });
        }

        let (add, body) = match raw.strip_prefix('+') {
            Some(body) => (true, body),
            None => (false, raw),
        };
        let (key, value) = body.split_once('=').ok_or_else(bad)?;
        let key = key.trim();
        if !valid_key(key) {
            return Err(bad());
        }
        let value = parse_value(value.trim());

        Ok(if add {
            Override::Add { key: key.to_string(), value }
        } else {
            Override::Set { key: key.to_string(), value }
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Override::Set { key, .. } | Override::Add { key, .. } | Override::Delete { key } => key,
        }
    }

    /// Apply to a composed tree.
    pub fn apply(&self, root: &mut Value) -> Result<(), ConfigError> {
        match self {
            Override::Set { key, value } => {
                if lookup(root, key).is_none() {
                    return Err(ConfigError::UnknownOverrideKey(key.clone()));
                }
                set_path(root, key, value.clone())
            }
            Override::Add { key, value } => {
                if lookup(root, key).is_some() {
                    return Err(ConfigError::DuplicateKey(key.clone()));
                }
                set_path(root, key, value.clone())
            }
            Override::Delete { key } => {
                if remove_path(root, key) {
                    Ok(())
                } else {
                    Err(ConfigError::MissingKey(key.clone()))
                }
            }
        }
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.split('.').all(|s| !s.is_empty() && !s.contains(char::is_whitespace))
}

fn parse_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
