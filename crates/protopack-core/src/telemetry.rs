//! Tracing initialisation for the protopack daemon.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// HTTP stack crates that are chatty below `warn`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "h2", "reqwest", "rustls"];

/// Verbosity and line format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub json: bool,
}

impl LogSettings {
    /// `log_level` and `log_json` from the config. An unknown level
    /// falls back to `info`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.log_level.parse().unwrap_or(Level::INFO),
            json: config.log_json,
        }
    }

    /// Force JSON output on top of whatever the config says.
    pub fn force_json(mut self, json: bool) -> Self {
        self.json |= json;
        self
    }

    /// Filter directives used when `RUST_LOG` is unset.
    pub fn directives(&self) -> String {
        let mut directives = self.level.as_str().to_ascii_lowercase();
        for krate in QUIET_DEPENDENCIES {
            directives.push_str(&format!(",{krate}=warn"));
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG` wins when set.
pub fn init_tracing(settings: LogSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directives()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}
