//! Change-tracking store built on a single dispatcher callback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use crate::dispatcher::{DispatchToken, Dispatcher};
use crate::error::{DispatchResult, StoreError, StoreResult};
use crate::sync::lock;

/// Identifies one listener within a [`Store`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;
type Handler<P> = Box<dyn Fn(&StoreContext<'_, P>, &P) + Send + Sync>;

struct Listeners {
    entries: BTreeMap<ListenerId, Listener>,
    last_id: u64,
}

/// `active` is set only while this store's own callback runs.
#[derive(Default)]
struct ChangeState {
    active: Option<ThreadId>,
    changed: bool,
}

struct StoreInner<P> {
    dispatcher: Arc<Dispatcher<P>>,
    token: DispatchToken,
    handler: Handler<P>,
    listeners: Arc<Mutex<Listeners>>,
    change: Mutex<ChangeState>,
}

/// A dispatcher callback that tracks whether its handler changed anything and
/// notifies listeners when it did.
///
/// The handler receives a [`StoreContext`] scoped to the current invocation.
/// Calling [`StoreContext::emit_change`] marks the store as changed; once the
/// handler returns, every listener is invoked before the dispatcher moves on
/// to the next callback.
///
/// Cloning a `Store` yields another handle to the same registration. The
/// callback is unregistered when the last handle is dropped, so a store
/// created with `let _ = Store::new(..)` never runs. A handler that captures
/// a clone of its own store keeps itself alive and stays registered for the
/// dispatcher's lifetime.
pub struct Store<P> {
    inner: Arc<StoreInner<P>>,
}

impl<P> Store<P>
where
    P: Send + Sync + 'static,
{
    pub fn new<F>(dispatcher: Arc<Dispatcher<P>>, handler: F) -> Self
    where
        F: Fn(&StoreContext<'_, P>, &P) + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<P>>| {
            let weak = weak.clone();
            let token = dispatcher.register(move |payload: &P| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_dispatch(payload);
                }
            });

            StoreInner {
                dispatcher,
                token,
                handler: Box::new(handler),
                listeners: Arc::new(Mutex::new(Listeners {
                    entries: BTreeMap::new(),
                    last_id: 0,
                })),
                change: Mutex::new(ChangeState::default()),
            }
        });

        Self { inner }
    }
}

impl<P> Store<P> {
    /// Add a listener invoked (with no arguments) after every dispatch in
    /// which this store changed.
    ///
    /// Listeners run after the handler has returned, outside the store's own
    /// callback, so [`has_changed`](Self::has_changed) and
    /// [`emit_change`](Self::emit_change) fail there with
    /// [`StoreError::RequiresDispatching`].
    ///
    /// The returned handle removes exactly this listener. Dropping the handle
    /// does not remove it.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = lock(&self.inner.listeners);
            listeners.last_id += 1;
            let id = ListenerId(listeners.last_id);
            listeners.entries.insert(id, Arc::new(listener));
            id
        };

        tracing::debug!(token = %self.inner.token, listener = %id, "Added store listener");
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).entries.len()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<P>> {
        &self.inner.dispatcher
    }

    pub fn dispatcher_token(&self) -> DispatchToken {
        self.inner.token
    }

    /// Whether the handler has emitted a change in the current invocation.
    ///
    /// Only valid on the dispatching thread while this store's own callback
    /// runs; anywhere else it fails with [`StoreError::RequiresDispatching`].
    pub fn has_changed(&self) -> StoreResult<bool> {
        let change = lock(&self.inner.change);
        if !change.is_active_here() {
            return Err(StoreError::RequiresDispatching);
        }
        Ok(change.changed)
    }

    /// Mark the store as changed. Same precondition as
    /// [`has_changed`](Self::has_changed).
    pub fn emit_change(&self) -> StoreResult<()> {
        let mut change = lock(&self.inner.change);
        if !change.is_active_here() {
            return Err(StoreError::RequiresDispatching);
        }
        change.changed = true;
        Ok(())
    }
}

impl<P> Clone for Store<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for Store<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("token", &self.inner.token)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ChangeState {
    fn is_active_here(&self) -> bool {
        self.active == Some(thread::current().id())
    }
}

impl<P> StoreInner<P> {
    fn on_dispatch(&self, payload: &P) {
        let changed = {
            let scope = ChangeScope::enter(&self.change);
            (self.handler)(&StoreContext { store: self }, payload);
            scope.changed()
        };

        if changed {
            self.notify();
        }
    }

    fn notify(&self) {
        // Listeners may add or remove listeners; iterate over a snapshot.
        let snapshot: Vec<Listener> = lock(&self.listeners).entries.values().cloned().collect();

        tracing::debug!(
            token = %self.token,
            listeners = snapshot.len(),
            "Store changed, notifying listeners"
        );
        for listener in snapshot {
            listener();
        }
    }
}

impl<P> Drop for StoreInner<P> {
    fn drop(&mut self) {
        // Already gone if the owner unregistered the token by hand.
        let _ = self.dispatcher.unregister(self.token);
    }
}

/// Marks the store active for the current thread and clears the change flag
/// on both entry and exit.
struct ChangeScope<'a> {
    change: &'a Mutex<ChangeState>,
}

impl<'a> ChangeScope<'a> {
    fn enter(change: &'a Mutex<ChangeState>) -> Self {
        let mut state = lock(change);
        state.active = Some(thread::current().id());
        state.changed = false;
        drop(state);
        Self { change }
    }

    fn changed(&self) -> bool {
        lock(self.change).changed
    }
}

impl Drop for ChangeScope<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.change);
        state.active = None;
        state.changed = false;
    }
}

/// Handle to the invocation of a store's handler during one dispatch.
pub struct StoreContext<'a, P> {
    store: &'a StoreInner<P>,
}

impl<P> StoreContext<'_, P> {
    /// Mark the store as changed. Idempotent.
    pub fn emit_change(&self) {
        lock(&self.store.change).changed = true;
    }

    pub fn has_changed(&self) -> bool {
        lock(&self.store.change).changed
    }

    pub fn dispatcher_token(&self) -> DispatchToken {
        self.store.token
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<P>> {
        &self.store.dispatcher
    }

    /// Shorthand for [`Dispatcher::wait_for`] on this store's dispatcher.
    pub fn wait_for(&self, tokens: &[DispatchToken]) -> DispatchResult<()> {
        self.store.dispatcher.wait_for(tokens)
    }
}

/// Removes one listener from the store it was added to.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    listeners: Weak<Mutex<Listeners>>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Calling this more than once, or after the store
    /// is gone, does nothing.
    pub fn remove(&self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        if lock(&listeners).entries.remove(&self.id).is_some() {
            tracing::debug!(listener = %self.id, "Removed store listener");
        }
    }
}
