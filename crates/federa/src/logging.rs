use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose events follow `--log-level`. Everything else stays at warn or quieter.
const FEDERA_TARGETS: [&str; 4] = ["federa", "federa_codec", "federa_transport", "federa_runtime"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    FEDERA_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Install the stderr subscriber. Output on stdout stays machine-readable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let verbose = matches!(level, LogLevel::Debug | LogLevel::Trace);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(verbose);
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn level_applies_to_workspace_crates() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("federa_runtime::runtime", &Level::TRACE));
        assert!(filter.would_enable("federa_codec", &Level::DEBUG));
    }

    #[test]
    fn other_crates_stay_at_warn() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("tokio_util::codec", &Level::WARN));
        assert!(!filter.would_enable("tokio_util::codec", &Level::INFO));

        let quiet = targets(LogLevel::Error);
        assert!(!quiet.would_enable("tokio_util::codec", &Level::WARN));
        assert!(!quiet.would_enable("federa_transport", &Level::WARN));
    }
}
