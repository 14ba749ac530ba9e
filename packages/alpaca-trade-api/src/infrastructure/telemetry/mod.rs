//! Tracing Subscriber Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. The
//! library only emits events; applications that already install their own
//! subscriber should skip this.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default adds `alpaca_trade_api=info`)
//! - `APCA_LOG_TARGETS`: set to "false" to hide event targets
//!
//! # Usage
//!
//! ```ignore
//! use alpaca_trade_api::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!("Starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive always added on top of `RUST_LOG`.
const DEFAULT_DIRECTIVE: &str = "alpaca_trade_api=info";

/// Noisy dependencies capped at `warn`.
const QUIET_DEPENDENCIES: [&str; 4] = ["hyper=warn", "reqwest=warn", "rustls=warn", "tungstenite=warn"];

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Extra filter directive for this crate.
    pub directive: String,
    /// Print event targets.
    pub with_target: bool,
    /// Emit logs without ANSI colours.
    pub plain: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_string(),
            with_target: true,
            plain: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let with_target = std::env::var("APCA_LOG_TARGETS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            with_target,
            plain: std::env::var_os("NO_COLOR").is_some(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env();
        let directives = std::iter::once(self.directive.as_str()).chain(QUIET_DEPENDENCIES);
        for raw in directives {
            match raw.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid log directive '{raw}': {e}"),
            }
        }
        filter
    }
}

/// Initialize logging with configuration from the environment.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize logging with custom configuration.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with_config(config: &TelemetryConfig) -> bool {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_ansi(!config.plain)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

// =============================================================================
// Tests
// =============================================================================
