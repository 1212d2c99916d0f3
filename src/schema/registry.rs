//! Per-module schema storage.
//!
//! Pure data: no merge of override layers happens here. Schemas are held in
//! `Arc`s so engine snapshots can be cloned cheaply on every write.

use super::ConfigSchema;
use std::collections::HashMap;
use std::sync::Arc;

/// Registered schemas keyed by module name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ConfigSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, merging additively into an existing one.
    ///
    /// Returns `true` when the module already had a schema.
    pub fn define(&mut self, module: &str, schema: ConfigSchema) -> bool {
        match self.schemas.get_mut(module) {
            Some(existing) => {
                Arc::make_mut(existing).merge(schema);
                true
            }
            None => {
                self.schemas.insert(module.to_string(), Arc::new(schema));
                false
            }
        }
    }

    pub fn get(&self, module: &str) -> Option<Arc<ConfigSchema>> {
        self.schemas.get(module).cloned()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.schemas.contains_key(module)
    }

    /// Registered module names, sorted.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn clear(&mut self) {
        self.schemas.clear();
    }
}
