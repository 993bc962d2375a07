// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer turns a composed configuration into a run. It
// instantiates components through the registry and drives them
// in the order the lifecycle allows.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// `callbacks:` / `logger:` sections → lists of components
pub mod instantiate;

// Train / test state machine and stage runner
pub mod lifecycle;

// The training workflow
pub mod train_use_case;

// The inference workflow
pub mod infer_use_case;

use anyhow::{Context, Result};

use crate::config::ConfigTree;
use crate::ml::backend::Accelerator;

/// Read an accelerator choice at `path`, falling back to `default`
/// when the key is absent or null.
pub(crate) fn accelerator_at(cfg: &ConfigTree, path: &str, default: Accelerator) -> Result<Accelerator> {
    match cfg.get(path) {
        None | Some(serde_yaml::Value::Null) => Ok(default),
        Some(value) => serde_yaml::from_value(value.clone())
            .with_context(|| format!("'{path}' must be one of cpu, gpu, auto")),
    }
}
