use std::env;

const DEFAULT_LABEL: &str = "todos";
const DEFAULT_ROUNDS: usize = 3;

/// Demo configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Dispatcher label shown in log output.
    pub label: String,
    /// How many times the scripted session is replayed.
    pub rounds: usize,
}

impl DemoConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            label: env::var("FLUX_DEMO_LABEL").unwrap_or_else(|_| DEFAULT_LABEL.to_string()),
            rounds: env::var("FLUX_DEMO_ROUNDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ROUNDS),
        }
    }

    pub fn log(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  FLUX_DEMO_LABEL: {}", self.label);
        tracing::info!("  FLUX_DEMO_ROUNDS: {}", self.rounds);
    }
}
