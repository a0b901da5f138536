//! Logging setup
//!
//! Every event this crate emits uses the `booster` target: context forks and
//! solution swaps at `debug`, per-dependency decisions (current value reused,
//! override, invalidation, generation entered) at `trace`, and cleanup
//! failures that cannot be returned to a caller at `warn`.
//!
//! The subscriber helpers here need the `logging-json` or `logging-pretty`
//! feature; without either they do nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use booster::logging;
//!
//! // JSON with `logging-json`, pretty with `logging-pretty`
//! logging::init();
//!
//! // Resolution traces only, ignoring other crates
//! logging::builder()
//!     .trace()
//!     .booster_only()
//!     .compact()
//!     .init();
//! ```

use tracing::Level;

/// Target of every event emitted by this crate
pub const TARGET: &str = "booster";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON lines
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
    /// Single-line output
    Compact,
}

/// Builder for a `tracing-subscriber` registry.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Per-dependency resolution decisions
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only cleanup failures and other problems
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Only show events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    pub fn booster_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Prefer `RUST_LOG` when it is set
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// The filter directive this builder installs
    pub fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{}={}", target, self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing if a global subscriber is already set. `Json` falls back
    /// to single-line text when `logging-json` is off.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
        } else {
            EnvFilter::new(self.directive())
        };

        let (file, line, thread_ids) = (self.with_file, self.with_line_number, self.with_thread_ids);
        macro_rules! install {
            ($layer:expr) => {{
                let layer = $layer
                    .with_file(file)
                    .with_line_number(line)
                    .with_thread_ids(thread_ids)
                    .with_target(true);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }};
        }

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => install!(fmt::layer().json()),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => install!(fmt::layer()),
            LogFormat::Pretty => install!(fmt::layer().pretty()),
            LogFormat::Compact => install!(fmt::layer().compact()),
        }
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON with `logging-json`, otherwise pretty output
pub fn init() {
    if cfg!(feature = "logging-json") {
        init_json();
    } else {
        init_pretty();
    }
}

/// JSON lines at `debug`, ideal for aggregated production logs.
///
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","fields":{"message":"Activating provider solution","providers":3,"depth":0},"target":"booster"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Human-readable output at `debug`.
///
/// ```text
///   2026-01-01T00:00:00.000Z DEBUG booster: Entered shared scope, scope_id: 1, shared: 2
/// ```
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Only this crate's events, honoring `RUST_LOG` when set
pub fn init_booster_only() {
    builder().booster_only().from_env().debug().init();
}
