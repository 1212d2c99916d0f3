//! Scoped override layers.
//!
//! Every layer carries a scope selector and a registration sequence number.
//! Layers that apply to an identity are ordered by specificity first
//! (global < module < slot < extension) and by sequence second, so a more
//! specific layer always wins regardless of when it arrived, and among equally
//! specific layers the last registered wins.

pub mod provide;

pub use provide::{ProvideReport, parse_provide};

use crate::types::ConfigIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Which identities a layer applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum OverrideScope {
    /// Every identity.
    Global,
    /// A module's own config and every extension instance of that module.
    Module { module: String },
    /// Every extension mounted in a slot, optionally only under one owner.
    Slot {
        slot_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
    /// One extension instance, optionally narrowed by slot and owner.
    Extension {
        extension_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
}

impl OverrideScope {
    pub fn module(module: impl Into<String>) -> Self {
        OverrideScope::Module {
            module: module.into(),
        }
    }

    /// Slot scope under a specific owner.
    pub fn slot(owner: impl Into<String>, slot_name: impl Into<String>) -> Self {
        OverrideScope::Slot {
            slot_name: slot_name.into(),
            owner: Some(owner.into()),
        }
    }

    /// Extension scope under a specific owner and slot.
    pub fn extension(
        owner: impl Into<String>,
        slot_name: impl Into<String>,
        extension_id: impl Into<String>,
    ) -> Self {
        OverrideScope::Extension {
            extension_id: extension_id.into(),
            slot_name: Some(slot_name.into()),
            owner: Some(owner.into()),
        }
    }

    /// Specificity rank. Higher ranks are applied later and win.
    pub fn rank(&self) -> u8 {
        match self {
            OverrideScope::Global => 0,
            OverrideScope::Module { .. } => 1,
            OverrideScope::Slot { .. } => 2,
            OverrideScope::Extension { .. } => 3,
        }
    }

    /// Whether a layer with this scope contributes to `identity`.
    pub fn applies_to(&self, identity: &ConfigIdentity) -> bool {
        match self {
            OverrideScope::Global => true,
            OverrideScope::Module { module } => identity.schema_module() == module,
            OverrideScope::Slot { slot_name, owner } => match identity.extension() {
                Some(ext) => ext.slot_name == *slot_name && owner_matches(owner, &ext.owning_module),
                None => false,
            },
            OverrideScope::Extension {
                extension_id,
                slot_name,
                owner,
            } => match identity.extension() {
                Some(ext) => {
                    ext.extension_id == *extension_id
                        && slot_name.as_ref().is_none_or(|s| *s == ext.slot_name)
                        && owner_matches(owner, &ext.owning_module)
                }
                None => false,
            },
        }
    }
}

/// An unconstrained owner matches anything; a constrained one needs an equal owner.
fn owner_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual.as_deref() == Some(w.as_str()),
    }
}

impl fmt::Display for OverrideScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideScope::Global => write!(f, "global"),
            OverrideScope::Module { module } => write!(f, "module {}", module),
            OverrideScope::Slot { slot_name, owner } => {
                write!(f, "slot {}", slot_name)?;
                if let Some(owner) = owner {
                    write!(f, " of {}", owner)?;
                }
                Ok(())
            }
            OverrideScope::Extension {
                extension_id,
                slot_name,
                owner,
            } => {
                write!(f, "extension {}", extension_id)?;
                if let Some(slot) = slot_name {
                    write!(f, " in {}", slot)?;
                }
                if let Some(owner) = owner {
                    write!(f, " of {}", owner)?;
                }
                Ok(())
            }
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LayerRef {
    /// The schema default.
    Default,
    /// An override layer.
    Override { scope: OverrideScope, seq: u64 },
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerRef::Default => write!(f, "default"),
            LayerRef::Override { scope, seq } => write!(f, "{} (#{})", scope, seq),
        }
    }
}

/// A partial configuration tree with its scope.
#[derive(Debug, Clone)]
pub struct OverrideLayer {
    pub scope: OverrideScope,
    pub tree: Map<String, Value>,
    /// Registration order across the whole store.
    pub seq: u64,
}

impl OverrideLayer {
    pub fn layer_ref(&self) -> LayerRef {
        LayerRef::Override {
            scope: self.scope.clone(),
            seq: self.seq,
        }
    }
}

/// All override layers registered so far.
///
/// Additive: layers are never replaced, only superseded by later or more
/// specific ones, until [`OverrideStore::clear`].
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    layers: Vec<Arc<OverrideLayer>>,
    next_seq: u64,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer and return its sequence number.
    pub fn push(&mut self, scope: OverrideScope, tree: Map<String, Value>) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.layers.push(Arc::new(OverrideLayer { scope, tree, seq }));
        seq
    }

    /// Layers contributing to `identity`, in application order.
    pub fn layers_for(&self, identity: &ConfigIdentity) -> Vec<Arc<OverrideLayer>> {
        let mut matching: Vec<Arc<OverrideLayer>> = self
            .layers
            .iter()
            .filter(|layer| layer.scope.applies_to(identity))
            .cloned()
            .collect();
        matching.sort_by_key(|layer| (layer.scope.rank(), layer.seq));
        matching
    }

    pub fn layers(&self) -> &[Arc<OverrideLayer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Drop every layer. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.layers.clear();
    }
}
