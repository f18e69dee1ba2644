//! Tracing subscriber setup.
//!
//! Diagnostics always go to stderr; stdout carries only the tables.

use std::str::FromStr;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

const APP_TARGET: &str = "pnlfolio";

/// Layout of diagnostic lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line records with fields spelled out.
    #[default]
    Pretty,
    /// One line per record.
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Filter directives for a run.
///
/// `RUST_LOG` takes over when set. `--verbose` adds debug output for this
/// crate on top of it; without either, nothing is logged.
fn filter_directives(verbose: bool, rust_log: Option<&str>) -> String {
    let app = format!("{APP_TARGET}=debug");
    match (rust_log.map(str::trim).filter(|s| !s.is_empty()), verbose) {
        (Some(env), true) => format!("{env},{app}"),
        (Some(env), false) => env.to_string(),
        (None, true) => app,
        (None, false) => "off".to_string(),
    }
}

pub fn init_logging(verbose: bool, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(filter_directives(verbose, rust_log.as_deref()));

    let layer = fmt::layer().without_time().with_writer(std::io::stderr);
    let layer = match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
}
