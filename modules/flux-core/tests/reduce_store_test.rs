//! Integration tests for ReduceStore: reducer application and equality-gated
//! notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use flux_core::{Dispatcher, ReduceStore, ReduceStoreOption, StoreError};

// ---------------------------------------------------------------------------
// Test state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
struct TestState {
    value: i32,
    map: HashMap<String, i32>,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    SetOne,
    Add(i32),
}

fn reduce(state: &TestState, action: &Action) -> TestState {
    let mut next = state.clone();
    match action {
        Action::SetOne => next.value = 1,
        Action::Add(n) => next.value += n,
    }
    next
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn dispatcher() -> Arc<Dispatcher<Action>> {
    Arc::new(Dispatcher::new())
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    (calls, move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn reduction_on_worker_thread_completes() -> Result<()> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let dispatcher = dispatcher();
        let store = ReduceStore::new(Arc::clone(&dispatcher), reduce, TestState::default(), []);
        let (calls, listener) = counter();
        store.add_listener(listener);

        let result = dispatcher.dispatch(Action::Add(2));
        let _ = tx.send((result, store.state().value, calls.load(Ordering::SeqCst)));
    });

    let (result, value, calls) = rx
        .recv_timeout(Duration::from_secs(5))
        .context("dispatch through a reduce store did not return")?;
    result?;
    assert_eq!(value, 2);
    assert_eq!(calls, 1);
    Ok(())
}

#[test]
fn first_change_notifies_and_repeat_does_not() -> Result<()> {
    let dispatcher = dispatcher();
    let reduced = Arc::new(AtomicUsize::new(0));

    let r = Arc::clone(&reduced);
    let store = ReduceStore::new(
        Arc::clone(&dispatcher),
        move |state: &TestState, action: &Action| {
            r.fetch_add(1, Ordering::SeqCst);
            reduce(state, action)
        },
        TestState::default(),
        [],
    );
    let (notified, listener) = counter();
    store.add_listener(listener);

    assert_eq!(*store.state(), TestState::default());
    assert_eq!(reduced.load(Ordering::SeqCst), 0);

    dispatcher.dispatch(Action::SetOne)?;
    assert_eq!(store.state().value, 1);
    assert_eq!(reduced.load(Ordering::SeqCst), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    dispatcher.dispatch(Action::SetOne)?;
    assert_eq!(store.state().value, 1);
    assert_eq!(reduced.load(Ordering::SeqCst), 2);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn custom_equality_suppresses_notification_but_keeps_result() -> Result<()> {
    let dispatcher = dispatcher();
    let store = ReduceStore::new(
        Arc::clone(&dispatcher),
        reduce,
        TestState::default(),
        [ReduceStoreOption::are_equal(|_: &TestState, _: &TestState| true)],
    );
    let (notified, listener) = counter();
    store.add_listener(listener);

    dispatcher.dispatch(Action::SetOne)?;

    assert_eq!(notified.load(Ordering::SeqCst), 0);
    // Equal results still replace the state.
    assert_eq!(store.state().value, 1);
    assert!(store.are_equal(&TestState::default(), &store.state()));
    Ok(())
}

#[test]
fn options_apply_in_order() -> Result<()> {
    let dispatcher = dispatcher();
    let store = ReduceStore::new(
        Arc::clone(&dispatcher),
        reduce,
        TestState::default(),
        [
            ReduceStoreOption::are_equal(|_: &TestState, _: &TestState| true),
            ReduceStoreOption::are_equal(|a: &TestState, b: &TestState| a.value == b.value),
        ],
    );
    let (notified, listener) = counter();
    store.add_listener(listener);

    dispatcher.dispatch(Action::Add(2))?;
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(!store.are_equal(&TestState::default(), &store.state()));
    Ok(())
}

#[test]
fn default_equality_is_structural() {
    let dispatcher = dispatcher();
    let store = ReduceStore::new(dispatcher, reduce, TestState::default(), []);

    let mut with_entry = TestState::default();
    with_entry.map.insert("test".into(), 2);

    assert!(store.are_equal(&TestState::default(), &TestState::default()));
    assert!(!store.are_equal(&TestState::default(), &with_entry));
}

#[test]
fn state_is_a_shared_immutable_snapshot() -> Result<()> {
    let dispatcher = dispatcher();
    let mut initial = TestState::default();
    initial.map.insert("test".into(), 2);
    let store = ReduceStore::new(Arc::clone(&dispatcher), reduce, initial, []);

    let before = store.state();
    let mut copy = (*before).clone();
    copy.map.insert("test".into(), 10);
    assert_eq!(store.state().map["test"], 2);

    dispatcher.dispatch(Action::Add(5))?;
    // Earlier snapshots are unaffected by later reductions.
    assert_eq!(before.value, 0);
    assert_eq!(store.state().value, 5);
    Ok(())
}

#[test]
fn with_equality_supports_states_without_partial_eq() -> Result<()> {
    struct Counter(i32);

    let dispatcher = dispatcher();
    let store = ReduceStore::with_equality(
        Arc::clone(&dispatcher),
        |state: &Counter, action: &Action| match action {
            Action::SetOne => Counter(1),
            Action::Add(n) => Counter(state.0 + n),
        },
        Counter(0),
        |a: &Counter, b: &Counter| a.0 == b.0,
    );
    let (notified, listener) = counter();
    store.add_listener(listener);

    dispatcher.dispatch(Action::Add(0))?;
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    dispatcher.dispatch(Action::Add(3))?;
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(store.state().0, 3);
    Ok(())
}

#[test]
fn reduce_store_delegates_store_accessors() {
    let dispatcher = dispatcher();
    let store = ReduceStore::new(Arc::clone(&dispatcher), reduce, TestState::default(), []);

    assert!(Arc::ptr_eq(store.dispatcher(), &dispatcher));
    assert_eq!(store.dispatcher_token(), store.store().dispatcher_token());
    assert_eq!(store.emit_change(), Err(StoreError::RequiresDispatching));
    assert_eq!(store.has_changed(), Err(StoreError::RequiresDispatching));
}

#[test]
fn dependent_store_reads_updated_state_through_wait_for() -> Result<()> {
    let dispatcher = dispatcher();
    let totals = ReduceStore::new(Arc::clone(&dispatcher), reduce, TestState::default(), []);

    let source = totals.clone();
    let doubled = ReduceStore::new(
        Arc::clone(&dispatcher),
        move |_state: &i32, _action: &Action| {
            source
                .dispatcher()
                .wait_for(&[source.dispatcher_token()])
                .unwrap();
            source.state().value * 2
        },
        0,
        [],
    );

    dispatcher.dispatch(Action::Add(4))?;
    assert_eq!(doubled.state().as_ref(), &8);

    dispatcher.dispatch(Action::Add(1))?;
    assert_eq!(*doubled.state(), 10);
    Ok(())
}
