//! Synchronous in-process broadcast dispatcher.
//!
//! A [`Dispatcher`] delivers each payload to every registered callback,
//! in-line on the calling thread. Callbacks order themselves with
//! [`Dispatcher::wait_for`]; circular waits are detected as they are walked.
//!
//! Two layers sit on top: [`Store`] tracks whether its handler changed
//! anything during a dispatch and notifies listeners when it did, and
//! [`ReduceStore`] derives new state from a reducer and only notifies when the
//! result differs from the previous state.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod reduce_store;
pub mod store;
mod sync;

pub use config::DispatcherConfig;
pub use dispatcher::{DispatchToken, Dispatcher};
pub use error::{DispatchError, DispatchResult, StoreError, StoreResult};
pub use reduce_store::{ReduceStore, ReduceStoreConfig, ReduceStoreOption};
pub use store::{ListenerHandle, ListenerId, Store, StoreContext};
