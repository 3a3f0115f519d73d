use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flux_core::{Dispatcher, DispatcherConfig};

mod config;
mod todos;

use config::DemoConfig;
use todos::TodoApp;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("flux=info".parse()?))
        .init();

    info!("Flux demo starting...");

    let config = DemoConfig::from_env();
    config.log();

    let dispatcher = Arc::new(Dispatcher::with_config(
        DispatcherConfig::new().with_label(&config.label),
    ));
    let app = TodoApp::new(Arc::clone(&dispatcher));

    let todos = app.todos.clone();
    app.todos.add_listener(move || {
        let titles: Vec<String> = todos
            .state()
            .iter()
            .map(|todo| {
                let mark = if todo.done { "x" } else { " " };
                format!("[{mark}] {}", todo.title)
            })
            .collect();
        println!("todos: {}", titles.join(", "));
    });

    let stats = app.stats.clone();
    app.stats.add_listener(move || {
        let stats = stats.state();
        println!("stats: {} total, {} done", stats.total, stats.done);
    });

    let audited = Arc::new(AtomicUsize::new(0));
    let a = Arc::clone(&audited);
    app.audit.add_listener(move || {
        a.fetch_add(1, Ordering::SeqCst);
    });

    for round in 1..=config.rounds {
        info!(round, "Replaying session");
        for action in TodoApp::script() {
            dispatcher.dispatch(action)?;
        }
    }

    let stats = app.stats.state();
    info!(
        total = stats.total,
        done = stats.done,
        actions = audited.load(Ordering::SeqCst),
        callbacks = dispatcher.len(),
        "Demo finished"
    );

    Ok(())
}
