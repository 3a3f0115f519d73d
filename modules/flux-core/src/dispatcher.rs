//! The dispatch loop.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::sync::lock;

/// Opaque handle for a callback registered with a [`Dispatcher`].
///
/// Tokens are assigned in strictly increasing order and never reused, even
/// after the callback they named has been unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatchToken(u64);

impl DispatchToken {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Registry<P> {
    callbacks: BTreeMap<DispatchToken, Callback<P>>,
    last_id: u64,
    dispatching: bool,
}

/// Bookkeeping for the dispatch cycle in flight. While `owner` is set, only
/// that thread touches `pending` and `handled`.
struct Cycle<P> {
    owner: Option<ThreadId>,
    payload: Option<Arc<P>>,
    pending: HashSet<DispatchToken>,
    handled: HashSet<DispatchToken>,
}

/// Synchronous broadcast dispatcher.
///
/// Every call to [`dispatch`](Self::dispatch) invokes each registered
/// callback exactly once, in-line, on the calling thread. Callbacks can call
/// [`wait_for`](Self::wait_for) to force other callbacks to finish first;
/// the dependency graph is discovered lazily and walked depth-first, so only
/// cycles that are actually traversed get reported.
///
/// Only one dispatch runs at a time. A second `dispatch`, whether from another
/// thread or reentrantly from inside a callback, is rejected with
/// [`DispatchError::AlreadyDispatching`].
pub struct Dispatcher<P> {
    config: DispatcherConfig,
    registry: Mutex<Registry<P>>,
    cycle: Mutex<Cycle<P>>,
}

impl<P> Dispatcher<P> {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry {
                callbacks: BTreeMap::new(),
                last_id: 0,
                dispatching: false,
            }),
            cycle: Mutex::new(Cycle {
                owner: None,
                payload: None,
                pending: HashSet::new(),
                handled: HashSet::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Register a callback to be invoked on every dispatch.
    pub fn register<F>(&self, callback: F) -> DispatchToken
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.last_id += 1;
        let token = DispatchToken::from_raw(registry.last_id);
        registry.callbacks.insert(token, Arc::new(callback));

        tracing::debug!(dispatcher = %self.config.label, token = %token, "Registered callback");
        token
    }

    /// Remove a callback. Safe to call while a dispatch is running; a callback
    /// removed mid-cycle that has not run yet is skipped.
    pub fn unregister(&self, token: DispatchToken) -> DispatchResult<()> {
        let mut registry = lock(&self.registry);
        if registry.callbacks.remove(&token).is_none() {
            return Err(DispatchError::NotMatchingCallback(token));
        }

        tracing::debug!(dispatcher = %self.config.label, token = %token, "Unregistered callback");
        Ok(())
    }

    pub fn is_registered(&self, token: DispatchToken) -> bool {
        lock(&self.registry).callbacks.contains_key(&token)
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        lock(&self.registry).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dispatching(&self) -> bool {
        lock(&self.registry).dispatching
    }

    /// Broadcast `payload` to every callback registered when the cycle starts.
    ///
    /// Callbacks run in registration order except where `wait_for` pulls one
    /// forward. Errors a callback receives from `wait_for` stay with that
    /// callback; they never abort the cycle. A panic inside a callback does:
    /// it unwinds out of `dispatch`, the remaining callbacks are skipped, and
    /// the dispatcher is left ready for the next cycle.
    pub fn dispatch(&self, payload: P) -> DispatchResult<()> {
        let tokens: Vec<DispatchToken> = {
            let mut registry = lock(&self.registry);
            if registry.dispatching {
                tracing::warn!(
                    dispatcher = %self.config.label,
                    "Rejected dispatch while another dispatch is running"
                );
                return Err(DispatchError::AlreadyDispatching);
            }
            registry.dispatching = true;
            registry.callbacks.keys().copied().collect()
        };

        let span = tracing::debug_span!(
            "dispatch",
            dispatcher = %self.config.label,
            callbacks = tokens.len()
        );
        let _enter = span.enter();

        let cycle = ActiveCycle::start(self, payload);

        for token in tokens {
            if lock(&self.cycle).pending.contains(&token) {
                continue;
            }
            // Unregistered after the cycle started.
            let Some(callback) = self.callback(token) else {
                continue;
            };
            self.invoke(token, &callback, &cycle.payload);
        }

        Ok(())
    }

    /// Run the callbacks named by `tokens` to completion before returning.
    ///
    /// Must be called from inside a callback of the running dispatch.
    /// Callbacks that already finished this cycle are skipped. Reaching a
    /// callback that is still running further up the call stack fails with
    /// [`DispatchError::CircularDependency`]; tokens after the failing one are
    /// not processed.
    pub fn wait_for(&self, tokens: &[DispatchToken]) -> DispatchResult<()> {
        let payload = {
            let cycle = lock(&self.cycle);
            match (cycle.owner, cycle.payload.as_ref()) {
                (Some(owner), Some(payload)) if owner == thread::current().id() => {
                    Arc::clone(payload)
                }
                _ => return Err(DispatchError::WaitForDispatching),
            }
        };

        for &token in tokens {
            {
                let cycle = lock(&self.cycle);
                if cycle.pending.contains(&token) {
                    if cycle.handled.contains(&token) {
                        continue;
                    }
                    tracing::warn!(
                        dispatcher = %self.config.label,
                        token = %token,
                        "Circular dependency detected in wait_for"
                    );
                    return Err(DispatchError::CircularDependency(token));
                }
            }

            let callback = self
                .callback(token)
                .ok_or(DispatchError::NotMatchingCallback(token))?;
            self.invoke(token, &callback, &payload);
        }

        Ok(())
    }

    fn callback(&self, token: DispatchToken) -> Option<Callback<P>> {
        lock(&self.registry).callbacks.get(&token).cloned()
    }

    fn invoke(&self, token: DispatchToken, callback: &Callback<P>, payload: &P) {
        lock(&self.cycle).pending.insert(token);
        tracing::trace!(token = %token, "Invoking callback");
        callback(payload);
        lock(&self.cycle).handled.insert(token);
    }
}

impl<P> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("Dispatcher")
            .field("label", &self.config.label)
            .field("callbacks", &registry.callbacks.len())
            .field("last_id", &registry.last_id)
            .field("dispatching", &registry.dispatching)
            .finish()
    }
}

/// Owns the per-cycle state for one `dispatch` call and resets it on drop,
/// including when a callback panics.
struct ActiveCycle<'a, P> {
    dispatcher: &'a Dispatcher<P>,
    payload: Arc<P>,
}

impl<'a, P> ActiveCycle<'a, P> {
    fn start(dispatcher: &'a Dispatcher<P>, payload: P) -> Self {
        let payload = Arc::new(payload);
        {
            let mut cycle = lock(&dispatcher.cycle);
            cycle.owner = Some(thread::current().id());
            cycle.payload = Some(Arc::clone(&payload));
            cycle.pending.clear();
            cycle.handled.clear();
        }
        Self {
            dispatcher,
            payload,
        }
    }
}

impl<P> Drop for ActiveCycle<'_, P> {
    fn drop(&mut self) {
        {
            let mut cycle = lock(&self.dispatcher.cycle);
            cycle.owner = None;
            cycle.payload = None;
        }
        lock(&self.dispatcher.registry).dispatching = false;

        if thread::panicking() {
            tracing::warn!(
                dispatcher = %self.dispatcher.config.label,
                "Dispatch aborted by a panicking callback"
            );
        }
    }
}
