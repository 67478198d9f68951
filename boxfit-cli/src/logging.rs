//! Structured logging for the boxfit binary.
//!
//! Events flow through `tracing`; the `log` facade is bridged so dependencies
//! using either API land in the same subscriber. Diagnostics go to `stderr`,
//! keeping `stdout` free for command output.

use std::{env, io, str::FromStr, sync::OnceLock};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FORMAT_ENV: &str = "BOXFIT_LOG_FORMAT";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format for diagnostic events.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Compact single-line output for terminals.
    #[default]
    Human,
    /// One JSON object per event, with span context attached.
    Json,
}

impl LogFormat {
    fn from_env() -> Result<Self, LoggingError> {
        match env::var(LOG_FORMAT_ENV) {
            Ok(raw) => raw.parse(),
            Err(env::VarError::NotPresent) => Ok(Self::default()),
            Err(source @ env::VarError::NotUnicode(_)) => Err(LoggingError::InvalidUnicode {
                name: LOG_FORMAT_ENV,
                source,
            }),
        }
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::UnsupportedFormat {
                provided: raw.trim().to_owned(),
            }),
        }
    }
}

/// Errors raised while configuring the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The format variable held non-UTF-8 bytes.
    #[error("environment variable `{name}` is not valid UTF-8: {source}")]
    InvalidUnicode {
        /// Variable that failed to decode.
        name: &'static str,
        /// Underlying decoding failure.
        #[source]
        source: env::VarError,
    },
    /// The format variable named a format this binary does not emit.
    #[error("unknown log format `{provided}`; use `human` or `json`")]
    UnsupportedFormat {
        /// Value found in the environment.
        provided: String,
    },
}

/// Configure the process-wide subscriber once.
///
/// The format follows `BOXFIT_LOG_FORMAT` (`human` by default, `json` for
/// machine consumption) and the filter follows `RUST_LOG`, defaulting to
/// `info`. Later calls are no-ops, as is running under a host that already
/// installed its own subscriber; the first configuration wins.
///
/// # Errors
/// Returns [`LoggingError`] when `BOXFIT_LOG_FORMAT` cannot be decoded or
/// names an unknown format.
pub fn init_logging() -> Result<(), LoggingError> {
    let format = LogFormat::from_env()?;
    INSTALLED.get_or_init(|| install(format));
    Ok(())
}

fn install(format: LogFormat) {
    // A bridge or subscriber installed by the host takes precedence.
    let _ = LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(event_layer(format))
        .with(filter)
        .try_init();
}

fn event_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    // Span close events carry the span's timing, so one line summarises each
    // instrumented operation.
    let base = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    match format {
        LogFormat::Human => base.boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("human", LogFormat::Human)]
    #[case("JSON", LogFormat::Json)]
    #[case("  json\t", LogFormat::Json)]
    fn recognised_formats_parse(#[case] raw: &str, #[case] expected: LogFormat) {
        assert_eq!(raw.parse::<LogFormat>().expect("format parses"), expected);
    }

    #[rstest]
    fn unknown_formats_are_rejected() {
        let error = "yaml".parse::<LogFormat>().expect_err("yaml is not a format");
        assert!(matches!(
            error,
            LoggingError::UnsupportedFormat { provided } if provided == "yaml"
        ));
    }

    #[rstest]
    fn repeated_initialisation_is_a_no_op() {
        init_logging().expect("first call configures logging");
        init_logging().expect("later calls return without work");
    }
}
