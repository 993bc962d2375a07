// ============================================================
// Layer 0 — Configuration
// ============================================================
// Everything a run needs is described by one YAML tree.
//
//   compose.rs     — loads the primary file and its `defaults`
//                    list (config groups), merges them in order
//   overrides.rs   — command-line `key=value` overrides
//   interpolate.rs — `${dotted.key}` and `${oc.env:VAR}` resolution
//   tree.rs        — the resolved, read-only tree and its nodes
//
// The tree is fully resolved before any component is built from it.

pub mod compose;
pub mod interpolate;
pub mod overrides;
pub mod tree;

use std::path::PathBuf;

use thiserror::Error;

pub use compose::Composer;
pub use tree::{ConfigNode, ConfigTree};

/// Key carrying the registered name of the component to build.
pub const TARGET_KEY: &str = "_target_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in '{origin}'")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("missing config key '{0}'")]
    MissingKey(String),

    #[error("config key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("malformed override '{0}' (expected key=value, +key=value or ~key)")]
    BadOverride(String),

    #[error("cannot override '{0}': key not in config, use +{0}=... to add it")]
    UnknownOverrideKey(String),

    #[error("cannot add '{0}': key already in config")]
    DuplicateKey(String),

    #[error("config group '{group}' has no option '{option}' (looked for '{}')", path.display())]
    MissingGroupOption {
        group: String,
        option: String,
        path: PathBuf,
    },

    #[error("config group '{0}' is not in the defaults list, use +{0}=... to add it")]
    UnknownGroup(String),

    #[error("invalid defaults entry in '{origin}': {detail}")]
    BadDefaults { origin: String, detail: String },

    #[error("defaults nesting deeper than {0} levels (include cycle?)")]
    IncludeDepth(usize),

    #[error("cannot resolve interpolation '${{{0}}}'")]
    Interpolation(String),

    #[error("interpolation cycle through '{0}'")]
    InterpolationCycle(String),

    #[error("invalid arguments for '{path}'")]
    Args {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
