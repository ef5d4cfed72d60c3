//! Process-wide `tracing` setup for the library and the `turnwire` binary.
//!
//! Stdout belongs to wire frames, so console logs always go to stderr.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "turnwire.logs.jsonl";
const DEFAULT_FILTER: &str = "info";

/// Where log records end up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    Disabled,
    /// Compact single-line records on stderr.
    Console,
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogSink {
    /// Chooses the sink from the raw `TURNWIRE_OBSERVABILITY_ENABLED` and
    /// `TURNWIRE_JSON_LOG_PATH` values. Unparseable flags leave logging on.
    pub fn resolve(enabled: Option<&str>, json_path: Option<&str>) -> Self {
        if !enabled.and_then(parse_bool).unwrap_or(true) {
            return LogSink::Disabled;
        }
        match json_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let path = Path::new(raw);
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE)
                    .to_string();
                LogSink::JsonFile { dir, file_name }
            }
            None => LogSink::Console,
        }
    }
}

/// `TURNWIRE_LOG_LEVEL` wins when it parses, then `RUST_LOG`, then `info`.
fn filter_directive(level: Option<&str>, rust_log: Option<&str>) -> String {
    [level, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty() && EnvFilter::try_new(directive).is_ok())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `TURNWIRE_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `TURNWIRE_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `TURNWIRE_JSON_LOG_PATH`: optional JSONL log file. Unset means compact stderr output.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let var = |key: &str| std::env::var(key).ok();
        let sink = LogSink::resolve(
            var("TURNWIRE_OBSERVABILITY_ENABLED").as_deref(),
            var("TURNWIRE_JSON_LOG_PATH").as_deref(),
        );
        let directive = filter_directive(
            var("TURNWIRE_LOG_LEVEL").as_deref(),
            var("RUST_LOG").as_deref(),
        );
        install(sink, EnvFilter::new(directive));
    });
}

fn install(sink: LogSink, filter: EnvFilter) {
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match sink {
        LogSink::Disabled => return,
        LogSink::Console => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogSink::JsonFile { dir, file_name } => {
            let _ = std::fs::create_dir_all(&dir);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(false)
                        .with_writer(tracing_appender::rolling::never(dir, file_name)),
                )
                .try_init()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_flag_wins_over_log_path() {
        assert_eq!(LogSink::resolve(Some("off"), Some("wire.jsonl")), LogSink::Disabled);
        assert_eq!(LogSink::resolve(Some("maybe"), None), LogSink::Console);
        assert_eq!(LogSink::resolve(None, Some("  ")), LogSink::Console);
    }

    #[test]
    fn json_path_splits_into_dir_and_file() {
        assert_eq!(
            LogSink::resolve(None, Some("wire.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("."),
                file_name: "wire.jsonl".into(),
            }
        );
        assert_eq!(
            LogSink::resolve(Some("yes"), Some("/var/log/turnwire/run.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("/var/log/turnwire"),
                file_name: "run.jsonl".into(),
            }
        );
    }

    #[test]
    fn invalid_level_falls_back_to_rust_log_then_info() {
        assert_eq!(filter_directive(Some("debug"), Some("warn")), "debug");
        assert_eq!(filter_directive(Some("turnwire=verbose"), Some("turnwire=trace")), "turnwire=trace");
        assert_eq!(filter_directive(None, None), "info");
        assert_eq!(filter_directive(Some(""), Some("turnwire=verbose")), "info");
    }
}
