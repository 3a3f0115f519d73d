//! Reducer-driven store with equality-gated change notification.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::dispatcher::{DispatchToken, Dispatcher};
use crate::error::StoreResult;
use crate::store::{ListenerHandle, Store, StoreContext};
use crate::sync::{read, write};

type Reducer<S, P> = Box<dyn Fn(&S, &P) -> S + Send + Sync>;
type AreEqual<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;

/// Settings a [`ReduceStoreOption`] can change.
pub struct ReduceStoreConfig<S> {
    are_equal: AreEqual<S>,
}

impl<S> ReduceStoreConfig<S> {
    pub fn set_are_equal<F>(&mut self, are_equal: F)
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        self.are_equal = Arc::new(are_equal);
    }
}

/// A configuration function applied to a [`ReduceStore`] at construction,
/// after the defaults and in the order given.
pub struct ReduceStoreOption<S>(Box<dyn FnOnce(&mut ReduceStoreConfig<S>) + Send>);

impl<S: 'static> ReduceStoreOption<S> {
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut ReduceStoreConfig<S>) + Send + 'static,
    {
        Self(Box::new(apply))
    }

    /// Replace the equality test used to decide whether a reduction changed
    /// the state.
    pub fn are_equal<F>(are_equal: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        Self::new(move |config| config.set_are_equal(are_equal))
    }

    fn apply(self, config: &mut ReduceStoreConfig<S>) {
        (self.0)(config)
    }
}

struct ReduceCore<S, P> {
    state: RwLock<Arc<S>>,
    reducer: Reducer<S, P>,
    are_equal: AreEqual<S>,
}

impl<S, P> ReduceCore<S, P> {
    fn current(&self) -> Arc<S> {
        Arc::clone(&read(&self.state))
    }

    fn reduce(&self, ctx: &StoreContext<'_, P>, payload: &P) {
        let current = self.current();
        let next = (self.reducer)(&*current, payload);
        let changed = !(self.are_equal)(&*current, &next);

        // Equal results still replace the state; only notification is gated.
        *write(&self.state) = Arc::new(next);

        if changed {
            ctx.emit_change();
        }
    }
}

/// A [`Store`] whose state is derived by a reducer on every dispatch.
///
/// For each payload the reducer computes the next state from the current
/// one. The result always becomes the new state, but listeners are only
/// notified when the equality test reports that it differs from the previous
/// state. The state is handed out as an `Arc<S>`, so readers can never mutate
/// it behind the store's back.
pub struct ReduceStore<S, P> {
    store: Store<P>,
    core: Arc<ReduceCore<S, P>>,
}

impl<S, P> ReduceStore<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Create a store comparing states with `PartialEq`, then apply `options`
    /// in order.
    pub fn new<R, I>(
        dispatcher: Arc<Dispatcher<P>>,
        reducer: R,
        initial_state: S,
        options: I,
    ) -> Self
    where
        S: PartialEq,
        R: Fn(&S, &P) -> S + Send + Sync + 'static,
        I: IntoIterator<Item = ReduceStoreOption<S>>,
    {
        let mut config = ReduceStoreConfig {
            are_equal: Arc::new(|a: &S, b: &S| a == b),
        };
        for option in options {
            option.apply(&mut config);
        }
        Self::build(dispatcher, Box::new(reducer), initial_state, config)
    }

    /// Create a store for a state type without `PartialEq`, using `are_equal`
    /// as the equality test.
    pub fn with_equality<R, E>(
        dispatcher: Arc<Dispatcher<P>>,
        reducer: R,
        initial_state: S,
        are_equal: E,
    ) -> Self
    where
        R: Fn(&S, &P) -> S + Send + Sync + 'static,
        E: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        let config = ReduceStoreConfig {
            are_equal: Arc::new(are_equal),
        };
        Self::build(dispatcher, Box::new(reducer), initial_state, config)
    }

    fn build(
        dispatcher: Arc<Dispatcher<P>>,
        reducer: Reducer<S, P>,
        initial_state: S,
        config: ReduceStoreConfig<S>,
    ) -> Self {
        let core = Arc::new(ReduceCore {
            state: RwLock::new(Arc::new(initial_state)),
            reducer,
            are_equal: config.are_equal,
        });

        let handler_core = Arc::clone(&core);
        let store = Store::new(dispatcher, move |ctx, payload| handler_core.reduce(ctx, payload));

        Self { store, core }
    }
}

impl<S, P> ReduceStore<S, P> {
    pub fn state(&self) -> Arc<S> {
        self.core.current()
    }

    pub fn are_equal(&self, one: &S, two: &S) -> bool {
        (self.core.are_equal)(one, two)
    }

    /// The underlying change-tracking store.
    pub fn store(&self) -> &Store<P> {
        &self.store
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.add_listener(listener)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<P>> {
        self.store.dispatcher()
    }

    pub fn dispatcher_token(&self) -> DispatchToken {
        self.store.dispatcher_token()
    }

    pub fn has_changed(&self) -> StoreResult<bool> {
        self.store.has_changed()
    }

    pub fn emit_change(&self) -> StoreResult<()> {
        self.store.emit_change()
    }
}

impl<S, P> Clone for ReduceStore<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<S: fmt::Debug, P> fmt::Debug for ReduceStore<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceStore")
            .field("token", &self.store.dispatcher_token())
            .field("state", &self.state())
            .finish()
    }
}
