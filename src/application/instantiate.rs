// ============================================================
// Layer 2 — Callback / Logger Aggregation
// ============================================================
// Turns a config section of named entries into an ordered list
// of objects:
//
//   callbacks:
//     model_checkpoint: {_target_: ModelCheckpoint, ...}   → built
//     early_stopping:   {_target_: EarlyStopping, ...}     → built
//     notes: "disabled for now"                            → skipped
//
// Entries keep their YAML order. An absent, null or empty section
// gives an empty list and a warning. An entry that has a `_target_`
// key is always built, so `_target_: null` is an error, not a skip.

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::callbacks::Callback;
use crate::config::{ConfigError, ConfigNode};
use crate::domain::traits::MetricsLogger;
use crate::registry::Registry;

pub fn instantiate_callbacks<B: AutodiffBackend>(
    registry: &Registry<Box<dyn Callback<B>>>,
    section:  Option<ConfigNode<'_>>,
) -> Result<Vec<Box<dyn Callback<B>>>> {
    instantiate_all(registry, section, "callback")
}

pub fn instantiate_loggers(
    registry: &Registry<Box<dyn MetricsLogger>>,
    section:  Option<ConfigNode<'_>>,
) -> Result<Vec<Box<dyn MetricsLogger>>> {
    instantiate_all(registry, section, "logger")
}

fn instantiate_all<T>(registry: &Registry<T>, section: Option<ConfigNode<'_>>, kind: &str) -> Result<Vec<T>> {
    let section = match section {
        Some(node) if !node.is_empty() => node,
        _ => {
            tracing::warn!("No {kind} configs found! Skipping..");
            return Ok(Vec::new());
        }
    };
    if !section.value().is_mapping() {
        return Err(ConfigError::WrongType {
            key:      section.path().to_string(),
            expected: "a mapping of named entries",
        }
        .into());
    }

    let mut built = Vec::new();
    for (_, entry) in section.entries() {
        if !entry.has_target_key() {
            continue;
        }
        let target = registry.check(&entry)?;
        tracing::info!("Instantiating {kind} <{target}>");
        built.push(registry.instantiate(&entry, &())?);
    }
    Ok(built)
}
