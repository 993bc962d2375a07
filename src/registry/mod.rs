// ============================================================
// Layer 2 — Component Registry
// ============================================================
// Maps the `_target_` name found in a config node to a factory
// function. Nothing is looked up reflectively: every buildable
// component is registered up front in components.rs, and every
// `_target_` in a run's configuration is checked against the
// registries before the first component is built.
//
//   model:
//     _target_: ImageClassifier   ← key into Registry<Classifier<B>, Device>
//     num_classes: 10             ← handed to the factory as the node

pub mod components;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{ConfigNode, TARGET_KEY};

pub use components::{Components, Section};

/// Builds a `T` from its config node plus a shared context
/// (the device for models, `()` for everything else).
pub type Factory<T, C> = fn(&ConfigNode<'_>, &C) -> Result<T>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("config node '{path}' has no `_target_`")]
    MissingTarget { path: String },

    #[error("`_target_` at '{path}' must be a component name, got {found}")]
    InvalidTarget { path: String, found: String },

    #[error("unknown {kind} <{target}> at '{path}' (registered: {known})")]
    UnknownTarget {
        kind:   &'static str,
        target: String,
        path:   String,
        known:  String,
    },
}

pub struct Registry<T, C = ()> {
    kind:      &'static str,
    factories: BTreeMap<&'static str, Factory<T, C>>,
}

impl<T, C> Registry<T, C> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, factories: BTreeMap::new() }
    }

    pub fn register(&mut self, target: &'static str, factory: Factory<T, C>) -> &mut Self {
        self.factories.insert(target, factory);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn contains(&self, target: &str) -> bool {
        self.factories.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Ensure `node` names a registered target. Returns the target name.
    pub fn check<'a>(&self, node: &ConfigNode<'a>) -> Result<&'a str, RegistryError> {
        let Some(target) = node.target() else {
            if node.has_target_key() {
                let found = node
                    .child(TARGET_KEY)
                    .map(|t| serde_yaml::to_string(t.value()).unwrap_or_default())
                    .unwrap_or_default();
                return Err(RegistryError::InvalidTarget {
                    path:  node.path().to_string(),
                    found: found.trim().to_string(),
                });
            }
            return Err(RegistryError::MissingTarget { path: node.path().to_string() });
        };
        if !self.contains(target) {
            return Err(RegistryError::UnknownTarget {
                kind:   self.kind,
                target: target.to_string(),
                path:   node.path().to_string(),
                known:  self.targets().collect::<Vec<_>>().join(", "),
            });
        }
        Ok(target)
    }

    pub fn instantiate(&self, node: &ConfigNode<'_>, ctx: &C) -> Result<T> {
        let target = self.check(node)?;
        let factory = self.factories[target];
        factory(node, ctx).with_context(|| format!("Failed to instantiate {} <{}>", self.kind, target))
    }
}
