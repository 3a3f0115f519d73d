//! Construction-time configuration for dispatchers.

const DEFAULT_LABEL: &str = "dispatcher";

/// Settings applied when a [`Dispatcher`](crate::Dispatcher) is created.
///
/// The label only shows up in tracing output; it lets logs from several
/// dispatchers in one process be told apart.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub label: String,
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}
