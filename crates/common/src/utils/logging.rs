use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Output shape of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines, no target.
    #[default]
    Compact,
    /// One JSON object per event, with target.
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is compact.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }

    /// Read `LOG_FORMAT`; unset means compact.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// Filter used when `RUST_LOG` is unset. Access lines are logged by
    /// `server::routes` at `info`; storage open/close comes from `service`.
    fn default_directives(self) -> &'static str {
        match self {
            LogFormat::Compact => "info,tower_http=info,axum=info",
            LogFormat::Json => "info,server::routes=info,service=info",
        }
    }
}

/// Install the stdout subscriber once; later calls are no-ops.
/// `RUST_LOG` overrides the per-format default filter.
pub fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format.default_directives()));
    let builder = fmt().with_env_filter(env_filter).with_writer(io::stdout);
    let _ = match format {
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
        LogFormat::Json => builder.with_target(true).json().try_init(),
    };
}

pub fn init_logging_from_env() {
    init_logging(LogFormat::from_env());
}
