//! Invalidation subscriptions.
//!
//! Reactive callers that hold a [`ResolvedConfig`](crate::types::ResolvedConfig)
//! subscribe to its identity. When a mutation touches that identity the
//! subscriber's watch channel receives the new engine version, so the caller
//! knows to fetch again.
//!
//! Notification is decided per mutation kind, the same way cache invalidation
//! is, through [`Mutation::affects`].

use crate::overrides::OverrideScope;
use crate::types::ConfigIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

/// A write that may change resolution results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A schema was defined or extended for a module.
    SchemaDefined { module: String },
    /// Override layers with these scopes were registered.
    OverridesProvided { scopes: Vec<OverrideScope> },
    /// Registry and overrides were reset.
    Cleared,
}

impl Mutation {
    /// Whether results for `identity` may differ after this mutation.
    pub fn affects(&self, identity: &ConfigIdentity) -> bool {
        match self {
            Mutation::SchemaDefined { module } => identity.schema_module() == module,
            Mutation::OverridesProvided { scopes } => {
                scopes.iter().any(|scope| scope.applies_to(identity))
            }
            Mutation::Cleared => true,
        }
    }
}

/// Receiving end of a subscription.
pub struct ConfigSubscription {
    pub identity: ConfigIdentity,
    /// Latest engine version that affected this identity.
    pub events: watch::Receiver<u64>,
}

impl ConfigSubscription {
    /// Wait for the next invalidation. Returns the engine version, or `None`
    /// once the engine is gone.
    pub async fn changed(&mut self) -> Option<u64> {
        if self.events.changed().await.is_err() {
            return None;
        }
        Some(*self.events.borrow_and_update())
    }

    /// Check for an unseen invalidation without waiting.
    pub fn has_pending_change(&self) -> bool {
        self.events.has_changed().unwrap_or(false)
    }

    /// Acknowledge the latest invalidation and return its version.
    pub fn mark_seen(&mut self) -> u64 {
        *self.events.borrow_and_update()
    }
}

/// Tracks subscribers per identity.
///
/// Thread-safe: uses an internal `Mutex` so it can be shared without `&mut self`.
#[derive(Default)]
pub struct SubscriptionManager {
    senders: Mutex<HashMap<ConfigIdentity, watch::Sender<u64>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to invalidations of `identity`. `version` is the current
    /// engine version, used as the initial (already seen) value.
    pub fn subscribe(&self, identity: &ConfigIdentity, version: u64) -> ConfigSubscription {
        let mut senders = self.senders.lock();
        let sender = senders
            .entry(identity.clone())
            .or_insert_with(|| watch::channel(version).0);
        ConfigSubscription {
            identity: identity.clone(),
            events: sender.subscribe(),
        }
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.senders.lock().is_empty()
    }

    /// Notify every subscriber affected by `mutation`; returns who was notified.
    ///
    /// Identities whose subscribers have all gone away are forgotten.
    pub fn notify(&self, mutation: &Mutation, version: u64) -> Vec<ConfigIdentity> {
        let mut senders = self.senders.lock();
        senders.retain(|_, sender| !sender.is_closed());

        let mut notified = Vec::new();
        for (identity, sender) in senders.iter() {
            if mutation.affects(identity) {
                sender.send_replace(version);
                notified.push(identity.clone());
            }
        }
        notified
    }
}
