//! Bindings from display targets to the request they currently show.
//!
//! Rebinding a target bumps its generation. A request remembers the
//! generation it was bound with and treats any other value as stale. Entries
//! hold the target weakly, so they never keep a destroyed target alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::domain::entities::CacheKey;
use crate::domain::ports::DisplayTarget;

/// Binds between sweeps for bindings of destroyed targets.
const PRUNE_INTERVAL: u64 = 256;

/// Identity of a display target, derived from its `Arc` allocation.
///
/// A registry entry keeps a `Weak` to the target, which pins the allocation,
/// so the address cannot be reused while the entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetKey(usize);

impl TargetKey {
    /// Returns the key for `target`.
    #[must_use]
    pub fn of(target: &Arc<dyn DisplayTarget>) -> Self {
        Self(Arc::as_ptr(target).cast::<()>() as usize)
    }
}

/// Proof of a binding, captured when a request is registered.
#[derive(Debug, Clone)]
pub struct BindingTicket {
    target: TargetKey,
    key: CacheKey,
    generation: u64,
}

impl BindingTicket {
    /// Cache key the ticket was issued for.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Generation the ticket was issued at.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

struct Binding {
    key: CacheKey,
    generation: u64,
    target: Weak<dyn DisplayTarget>,
}

/// Concurrent map from target to its latest binding. Last write wins.
pub struct TargetBindingRegistry {
    bindings: RwLock<HashMap<TargetKey, Binding>>,
    next_generation: AtomicU64,
}

impl TargetBindingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Binds `target` to `key`, invalidating every earlier ticket for it.
    pub fn bind(&self, target: &Arc<dyn DisplayTarget>, key: CacheKey) -> BindingTicket {
        let target_key = TargetKey::of(target);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let binding = Binding {
            key: key.clone(),
            generation,
            target: Arc::downgrade(target),
        };

        self.bindings.write().insert(target_key, binding);
        if generation % PRUNE_INTERVAL == 0 {
            self.prune();
        }

        trace!(key = %key, generation = generation, "Bound target");
        BindingTicket {
            target: target_key,
            key,
            generation,
        }
    }

    /// Removes the binding for `target`. Returns true if one existed.
    pub fn unbind(&self, target: &Arc<dyn DisplayTarget>) -> bool {
        self.bindings.write().remove(&TargetKey::of(target)).is_some()
    }

    /// Returns true if `ticket` is still the live binding of a live target.
    #[must_use]
    pub fn is_current(&self, ticket: &BindingTicket) -> bool {
        self.bindings.read().get(&ticket.target).is_some_and(|b| {
            b.generation == ticket.generation
                && b.key == ticket.key
                && b.target.strong_count() > 0
        })
    }

    /// Returns the key `target` is currently bound to.
    #[must_use]
    pub fn current_key(&self, target: &Arc<dyn DisplayTarget>) -> Option<CacheKey> {
        self.bindings
            .read()
            .get(&TargetKey::of(target))
            .map(|b| b.key.clone())
    }

    /// Drops entries whose target has been destroyed. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut bindings = self.bindings.write();
        let before = bindings.len();
        bindings.retain(|_, b| b.target.strong_count() > 0);
        before - bindings.len()
    }

    /// Number of bindings held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns true if no target is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TargetBindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
