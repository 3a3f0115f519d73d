//! Todo-list domain: actions, state, and the reducers the demo stores run.

use std::sync::Arc;

use flux_core::{Dispatcher, ReduceStore, Store};

#[derive(Debug, Clone)]
pub enum TodoAction {
    Add(String),
    Toggle(usize),
    ClearCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Todo {
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub done: usize,
}

#[allow(clippy::ptr_arg)]
pub fn reduce_todos(todos: &Vec<Todo>, action: &TodoAction) -> Vec<Todo> {
    let mut next = todos.clone();
    match action {
        TodoAction::Add(title) => next.push(Todo {
            title: title.clone(),
            done: false,
        }),
        TodoAction::Toggle(index) => {
            if let Some(todo) = next.get_mut(*index) {
                todo.done = !todo.done;
            }
        }
        TodoAction::ClearCompleted => next.retain(|todo| !todo.done),
    }
    next
}

/// The stores making up the demo application, all on one dispatcher.
pub struct TodoApp {
    pub dispatcher: Arc<Dispatcher<TodoAction>>,
    pub todos: ReduceStore<Vec<Todo>, TodoAction>,
    pub stats: ReduceStore<Stats, TodoAction>,
    pub audit: Store<TodoAction>,
}

impl TodoApp {
    pub fn new(dispatcher: Arc<Dispatcher<TodoAction>>) -> Self {
        let todos = ReduceStore::new(Arc::clone(&dispatcher), reduce_todos, Vec::new(), []);

        // Stats are derived from the todo list, so they must see it after
        // this cycle's reduction.
        let source = todos.clone();
        let stats = ReduceStore::new(
            Arc::clone(&dispatcher),
            move |stats: &Stats, _action: &TodoAction| {
                if let Err(e) = source.dispatcher().wait_for(&[source.dispatcher_token()]) {
                    tracing::warn!(error = %e, "Stats computed without waiting for todos");
                    return *stats;
                }
                let todos = source.state();
                Stats {
                    total: todos.len(),
                    done: todos.iter().filter(|todo| todo.done).count(),
                }
            },
            Stats::default(),
            [],
        );

        // Every action is worth an audit entry.
        let audit = Store::new(Arc::clone(&dispatcher), |ctx, action: &TodoAction| {
            tracing::debug!(action = ?action, "Audited action");
            ctx.emit_change();
        });

        Self {
            dispatcher,
            todos,
            stats,
            audit,
        }
    }

    /// The scripted session replayed by the demo.
    pub fn script() -> Vec<TodoAction> {
        vec![
            TodoAction::Add("write the dispatcher".into()),
            TodoAction::Add("write the stores".into()),
            TodoAction::Toggle(0),
            TodoAction::Toggle(7),
            TodoAction::ClearCompleted,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn stats_follow_todos_within_one_dispatch() {
        let app = TodoApp::new(Arc::new(Dispatcher::new()));

        app.dispatcher
            .dispatch(TodoAction::Add("a".into()))
            .unwrap();
        app.dispatcher.dispatch(TodoAction::Toggle(0)).unwrap();

        assert_eq!(*app.stats.state(), Stats { total: 1, done: 1 });
    }

    #[test]
    fn out_of_range_toggle_changes_nothing() {
        let app = TodoApp::new(Arc::new(Dispatcher::new()));
        let todo_changes = Arc::new(AtomicUsize::new(0));
        let audits = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&todo_changes);
        app.todos.add_listener(move || {
            t.fetch_add(1, Ordering::SeqCst);
        });
        let a = Arc::clone(&audits);
        app.audit.add_listener(move || {
            a.fetch_add(1, Ordering::SeqCst);
        });

        app.dispatcher.dispatch(TodoAction::Toggle(3)).unwrap();

        assert_eq!(todo_changes.load(Ordering::SeqCst), 0);
        assert_eq!(audits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_completed_keeps_open_items() {
        let todos = vec![
            Todo {
                title: "open".into(),
                done: false,
            },
            Todo {
                title: "closed".into(),
                done: true,
            },
        ];

        let next = reduce_todos(&todos, &TodoAction::ClearCompleted);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].title, "open");
    }
}
