//! Runtime configuration
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HEARTH_FATAL` | `panic` | What a fatal condition does: `panic` (unwind) or `abort` |
//! | `HEARTH_LOG` | `warn` | `tracing` filter directive used by `init_logging` |
//!
//! The environment is read once, on first use of [`core_config`]. Programs
//! that want a different configuration can build a [`CoreConfig`] directly
//! and pass it to [`init_logging`](crate::diagnostics::init_logging).

use std::sync::OnceLock;

pub const FATAL_ENV: &str = "HEARTH_FATAL";
pub const LOG_ENV: &str = "HEARTH_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

/// What to do after a fatal diagnostic has been reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FatalAction {
    /// Unwind with a panic carrying the diagnostic text (default)
    #[default]
    Panic,
    /// Terminate the process immediately
    Abort,
}

impl FatalAction {
    pub fn parse(value: &str) -> Option<FatalAction> {
        match value.trim().to_ascii_lowercase().as_str() {
            "panic" => Some(FatalAction::Panic),
            "abort" => Some(FatalAction::Abort),
            _ => None,
        }
    }
}

/// Configuration for the container layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub fatal_action: FatalAction,
    /// `EnvFilter` directive for the stderr subscriber
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            fatal_action: FatalAction::Panic,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var(FATAL_ENV) {
            match FatalAction::parse(&val) {
                Some(action) => config.fatal_action = action,
                None => tracing::warn!(
                    "{}='{}' not recognized, using '{:?}'",
                    FATAL_ENV,
                    val,
                    config.fatal_action
                ),
            }
        }

        if let Some(val) = var(LOG_ENV) {
            if !val.trim().is_empty() {
                config.log_filter = val;
            }
        }

        config
    }

    pub fn with_fatal_action(mut self, action: FatalAction) -> Self {
        self.fatal_action = action;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();

/// The process configuration, read from the environment on first call
pub fn core_config() -> &'static CoreConfig {
    CORE_CONFIG.get_or_init(CoreConfig::from_env)
}
