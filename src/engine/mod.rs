//! The configuration engine.
//!
//! Owns the schema registry, the override store and the resolution cache, and
//! is the only place where they change. State lives in an immutable
//! [`Snapshot`] published through an `ArcSwap`; writers build the next
//! snapshot under a single writer lock, publish it, and then invalidate the
//! cache entries the write affects. Readers never block on writers.
//!
//! The handle is cheap to clone and can be shared across tasks.

pub mod cache;
pub mod source;

pub use cache::CacheStats;
pub use source::{DirectorySchemaSource, SchemaSource};

use crate::error::{EngineError, EngineResult};
use crate::overrides::{OverrideScope, OverrideStore, ProvideReport, parse_provide};
use crate::resolve::{ResolvePolicy, Resolver};
use crate::schema::{ConfigSchema, SchemaRegistry, ValueType};
use crate::subscriptions::{ConfigSubscription, Mutation, SubscriptionManager};
use crate::types::{ConfigIdentity, ExtensionIdentity, MountContext, ResolvedConfig};
use arc_swap::ArcSwap;
use cache::{CacheEntry, ResolutionCache};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry and overrides as of one version.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub registry: SchemaRegistry,
    pub overrides: OverrideStore,
    /// Incremented on every write that changes resolution inputs.
    pub version: u64,
}

struct EngineInner {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    policy: ResolvePolicy,
    source: Option<Arc<dyn SchemaSource>>,
    cache: ResolutionCache,
    subscriptions: SubscriptionManager,
}

/// Builder for [`ConfigEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    policy: ResolvePolicy,
    source: Option<Arc<dyn SchemaSource>>,
}

impl EngineBuilder {
    pub fn policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch schemas lazily from `source` when an identity's module has none.
    pub fn source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> ConfigEngine {
        ConfigEngine {
            inner: Arc::new(EngineInner {
                snapshot: ArcSwap::from_pointee(Snapshot::default()),
                writer: Mutex::new(()),
                policy: self.policy,
                source: self.source,
                cache: ResolutionCache::default(),
                subscriptions: SubscriptionManager::new(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ConfigEngine {
    inner: Arc<EngineInner>,
}

impl Default for ConfigEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEngine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.inner.policy
    }

    /// Current registry and overrides.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.inner.snapshot.load().version
    }

    /// Apply a write to a copy of the current snapshot and publish it.
    ///
    /// When `mutate` reports no mutation nothing is published.
    fn write<R>(&self, mutate: impl FnOnce(&mut Snapshot) -> (R, Option<Mutation>)) -> R {
        let _guard = self.inner.writer.lock();
        let current = self.inner.snapshot.load_full();
        let mut next = Snapshot::clone(&current);
        let (out, mutation) = mutate(&mut next);
        let Some(mutation) = mutation else {
            return out;
        };

        next.version = current.version + 1;
        let version = next.version;
        self.inner.snapshot.store(Arc::new(next));

        // Invalidate only after publishing, so a resolution that re-fills an
        // entry after this point reads the new snapshot.
        let dropped = self.inner.cache.invalidate(&mutation);
        let notified = self.inner.subscriptions.notify(&mutation, version);
        debug!(
            version,
            dropped,
            notified = notified.len(),
            ?mutation,
            "Published configuration snapshot"
        );
        out
    }

    // ----- schemas -----

    /// Register a module's schema. A second definition merges into the first.
    pub fn define_schema(&self, module: &str, schema: ConfigSchema) {
        let keys = schema.len();
        let merged = self.write(|snap| {
            let existed = snap.registry.define(module, schema);
            (
                existed,
                Some(Mutation::SchemaDefined {
                    module: module.to_string(),
                }),
            )
        });
        info!(module = %module, keys, merged, "Schema defined");
    }

    /// Register a schema given as a schema document.
    pub fn define_schema_value(&self, module: &str, document: &Value) -> EngineResult<()> {
        let schema = ConfigSchema::from_value(module, document)?;
        self.define_schema(module, schema);
        Ok(())
    }

    pub fn schema(&self, module: &str) -> Option<Arc<ConfigSchema>> {
        self.inner.snapshot.load().registry.get(module)
    }

    /// Modules with a registered schema, sorted.
    pub fn modules(&self) -> Vec<String> {
        self.inner.snapshot.load().registry.modules()
    }

    // ----- overrides -----

    /// Register every override layer contained in a module-keyed payload.
    ///
    /// Malformed subtrees are skipped and reported; only a payload whose top
    /// level is not an object is rejected.
    pub fn provide(&self, payload: &Value) -> EngineResult<ProvideReport> {
        let parsed = parse_provide(payload)?;
        let mut report = ProvideReport {
            diagnostics: parsed.diagnostics,
            ..Default::default()
        };
        if parsed.layers.is_empty() {
            debug!(diagnostics = report.diagnostics.len(), "Provide payload had no layers");
            return Ok(report);
        }

        let scopes: Vec<OverrideScope> = parsed.layers.iter().map(|(s, _)| s.clone()).collect();
        let layers = parsed.layers;
        let mutation = Mutation::OverridesProvided {
            scopes: scopes.clone(),
        };
        report.seqs = self.write(|snap| {
            let seqs = layers
                .into_iter()
                .map(|(scope, tree)| snap.overrides.push(scope, tree))
                .collect();
            (seqs, Some(mutation))
        });
        report.scopes = scopes;

        info!(
            layers = report.layer_count(),
            diagnostics = report.diagnostics.len(),
            "Overrides provided"
        );
        Ok(report)
    }

    /// Register one layer with an explicit scope. Returns its sequence number.
    pub fn provide_layer(&self, scope: OverrideScope, tree: Value) -> EngineResult<u64> {
        let Value::Object(tree) = tree else {
            return Err(EngineError::MalformedProvide(format!(
                "layer for {} must be an object, got {}",
                scope,
                ValueType::name_of(&tree)
            )));
        };
        let mutation = Mutation::OverridesProvided {
            scopes: vec![scope.clone()],
        };
        let seq = self.write(|snap| (snap.overrides.push(scope, tree), Some(mutation)));
        debug!(seq, "Override layer provided");
        Ok(seq)
    }

    /// Register a layer that applies to every identity.
    pub fn provide_global(&self, tree: Value) -> EngineResult<u64> {
        self.provide_layer(OverrideScope::Global, tree)
    }

    // ----- resolution -----

    /// Resolve against the current snapshot, bypassing the cache.
    pub fn resolve(&self, identity: &ConfigIdentity) -> EngineResult<ResolvedConfig> {
        let snap = self.inner.snapshot.load();
        Resolver::new(&snap.registry, &snap.overrides)
            .with_policy(self.inner.policy)
            .with_version(snap.version)
            .resolve(identity)
    }

    /// Cached resolution for `identity`.
    ///
    /// The first access may suspend while a schema is fetched from the lazy
    /// source; concurrent callers share that one resolution. Later accesses
    /// return the cached value without suspending until a write invalidates
    /// it.
    pub async fn get(&self, identity: &ConfigIdentity) -> EngineResult<Arc<ResolvedConfig>> {
        let pending = {
            let mut entries = self.inner.cache.lock();
            match entries.get(identity) {
                Some(CacheEntry::Ready(resolved)) => {
                    self.inner.cache.record_hit();
                    return Ok(Arc::clone(resolved));
                }
                Some(CacheEntry::Pending { future, .. }) => {
                    self.inner.cache.record_wait();
                    future.clone()
                }
                None => {
                    self.inner.cache.record_miss();
                    let token = self.inner.cache.next_token();
                    let future = self
                        .clone()
                        .run_resolution(identity.clone(), token)
                        .boxed()
                        .shared();
                    entries.insert(
                        identity.clone(),
                        CacheEntry::Pending {
                            token,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };
        pending.await
    }

    /// A module's own configuration.
    pub async fn get_config(&self, module: &str) -> EngineResult<Arc<ResolvedConfig>> {
        self.get(&ConfigIdentity::module(module)).await
    }

    /// The configuration one mounted extension instance sees.
    pub async fn get_extension_config(
        &self,
        extension: &ExtensionIdentity,
    ) -> EngineResult<Arc<ResolvedConfig>> {
        self.get(&ConfigIdentity::Extension(extension.clone())).await
    }

    /// Configuration for the caller's position in the component tree.
    pub async fn get_in(&self, context: &MountContext) -> EngineResult<Arc<ResolvedConfig>> {
        self.get(&context.identity()).await
    }

    /// Cached value if one is ready. Never suspends and never resolves.
    pub fn try_get(&self, identity: &ConfigIdentity) -> Option<Arc<ResolvedConfig>> {
        self.inner.cache.ready(identity)
    }

    /// Cached resolution without the lazy source, for synchronous callers.
    pub fn get_now(&self, identity: &ConfigIdentity) -> EngineResult<Arc<ResolvedConfig>> {
        let mut entries = self.inner.cache.lock();
        if let Some(CacheEntry::Ready(resolved)) = entries.get(identity) {
            self.inner.cache.record_hit();
            return Ok(Arc::clone(resolved));
        }
        self.inner.cache.record_miss();
        self.inner.cache.record_resolution();
        let resolved = Arc::new(self.resolve(identity)?);
        if !entries.contains_key(identity) {
            entries.insert(identity.clone(), CacheEntry::Ready(Arc::clone(&resolved)));
        }
        Ok(resolved)
    }

    async fn run_resolution(
        self,
        identity: ConfigIdentity,
        token: u64,
    ) -> EngineResult<Arc<ResolvedConfig>> {
        let loaded = self.ensure_schema(identity.schema_module()).await;
        self.finish_resolution(&identity, token, loaded)
    }

    /// Fetch the module's schema from the lazy source if it is not registered.
    ///
    /// Concurrent callers for the same module share one fetch.
    async fn ensure_schema(&self, module: &str) -> EngineResult<()> {
        let Some(source) = self.inner.source.clone() else {
            return Ok(());
        };
        if self.inner.snapshot.load().registry.contains(module) {
            return Ok(());
        }

        let fetch = {
            let mut fetches = self.inner.cache.fetches();
            match fetches.get(module) {
                Some(fetch) => fetch.clone(),
                None => {
                    let fetch = self
                        .clone()
                        .fetch_schema(source, module.to_string())
                        .boxed()
                        .shared();
                    fetches.insert(module.to_string(), fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    async fn fetch_schema(self, source: Arc<dyn SchemaSource>, module: String) -> EngineResult<()> {
        debug!(module = %module, "Fetching schema from source");
        let outcome = match source.load_schema(&module).await {
            Ok(Some(schema)) => {
                self.define_fetched_schema(&module, schema);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(EngineError::source(&module, format!("{:#}", e))),
        };
        self.inner.cache.fetches().remove(&module);
        outcome
    }

    /// Register a fetched schema unless one was defined while it was loading.
    fn define_fetched_schema(&self, module: &str, schema: ConfigSchema) {
        let keys = schema.len();
        let defined = self.write(|snap| {
            if snap.registry.contains(module) {
                return (false, None);
            }
            snap.registry.define(module, schema);
            (
                true,
                Some(Mutation::SchemaDefined {
                    module: module.to_string(),
                }),
            )
        });
        if defined {
            info!(module = %module, keys, "Schema loaded from source");
        } else {
            debug!(module = %module, "Schema defined during fetch, discarding fetched copy");
        }
    }

    /// Resolve and store the result, holding the cache lock so no write can
    /// slip between reading the snapshot and filling the entry.
    fn finish_resolution(
        &self,
        identity: &ConfigIdentity,
        token: u64,
        loaded: EngineResult<()>,
    ) -> EngineResult<Arc<ResolvedConfig>> {
        let mut entries = self.inner.cache.lock();
        let outcome = loaded.and_then(|()| {
            self.inner.cache.record_resolution();
            self.resolve(identity).map(Arc::new)
        });

        let still_ours = matches!(
            entries.get(identity),
            Some(CacheEntry::Pending { token: t, .. }) if *t == token
        );
        if still_ours {
            match outcome {
                Ok(ref resolved) => {
                    entries.insert(identity.clone(), CacheEntry::Ready(Arc::clone(resolved)));
                }
                Err(ref e) => {
                    // Leave no entry so the next access retries.
                    entries.remove(identity);
                    warn!(identity = %identity, error = %e, "Resolution failed");
                }
            }
        }
        outcome
    }

    // ----- change tracking and maintenance -----

    /// Be told when `identity`'s resolution is invalidated.
    pub fn subscribe(&self, identity: &ConfigIdentity) -> ConfigSubscription {
        self.inner.subscriptions.subscribe(identity, self.version())
    }

    /// Drop every cached resolution. Schemas and overrides are kept.
    pub fn clear_config(&self) {
        self.inner.cache.clear();
        info!("Resolution cache cleared");
    }

    /// Reset schemas, overrides and cached resolutions.
    pub fn clear_all(&self) {
        self.write(|snap| {
            snap.registry.clear();
            snap.overrides.clear();
            ((), Some(Mutation::Cleared))
        });
        self.inner.cache.clear();
        info!("Configuration engine reset");
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Number of cache entries, ready or pending.
    pub fn cached_len(&self) -> usize {
        self.inner.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyDescriptor;
    use serde_json::json;

    fn engine() -> ConfigEngine {
        let engine = ConfigEngine::new();
        engine.define_schema(
            "foo-module",
            ConfigSchema::new().key("thing", KeyDescriptor::with_default(json!("foo thing"))),
        );
        engine
    }

    #[test]
    fn test_writes_bump_version() {
        let engine = ConfigEngine::new();
        assert_eq!(engine.version(), 0);
        engine.define_schema("m", ConfigSchema::new());
        engine.provide_global(json!({"a": 1})).unwrap();
        assert_eq!(engine.version(), 2);

        // A payload with nothing in it publishes nothing.
        engine.provide(&json!({})).unwrap();
        assert_eq!(engine.version(), 2);
    }

    #[test]
    fn test_get_now_caches_until_invalidated() {
        let engine = engine();
        let id = ConfigIdentity::module("foo-module");

        let first = engine.get_now(&id).unwrap();
        let second = engine.get_now(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.stats().resolutions, 1);

        engine
            .provide(&json!({"foo-module": {"thing": "bar thing"}}))
            .unwrap();
        assert!(engine.try_get(&id).is_none());
        let third = engine.get_now(&id).unwrap();
        assert_eq!(third.get("thing"), Some(&json!("bar thing")));
    }

    #[test]
    fn test_provide_layer_rejects_non_objects() {
        let engine = engine();
        let err = engine
            .provide_layer(OverrideScope::module("foo-module"), json!("nope"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedProvide(_)));
        assert_eq!(engine.version(), 1);
    }

    #[test]
    fn test_clear_all_resets_state() {
        let engine = engine();
        engine.provide_global(json!({"thing": "g"})).unwrap();
        engine.get_now(&ConfigIdentity::module("foo-module")).unwrap();

        engine.clear_all();
        assert!(engine.modules().is_empty());
        assert!(engine.snapshot().overrides.is_empty());
        assert_eq!(engine.cached_len(), 0);
    }
}
