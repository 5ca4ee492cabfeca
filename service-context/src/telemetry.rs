//! Library-scoped `tracing` output.
//!
//! Binaries compose [`layer`] with their own subscriber to get this crate's
//! events in a compact single-line format without touching other crates' logs.

use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Crate target prefix used to filter only library-originated logs.
pub const TARGET_PREFIX: &str = "service_context";

/// RFC3339 UTC timer, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        w.write_str(&now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// Formatting layer that renders ONLY events emitted by this crate.
///
/// Compact lines with RFC3339 timestamps, target and `file:line`, span close
/// events (durations of instrumented provider calls), ANSI colors only on a
/// terminal.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();
    let only_this_crate = filter::filter_fn(|meta| meta.target().starts_with(TARGET_PREFIX));

    fmt::layer()
        .with_ansi(use_ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(event_format())
        .with_filter(only_this_crate)
}

/// Compact event format with the RFC3339 timer, level, target and `file:line`.
fn event_format() -> fmt::format::Format<fmt::format::Compact, ChronoRfc3339Utc> {
    fmt::format()
        .compact()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_source_location(true)
}

/// Level directive for this library only, e.g. `service_context=debug`.
pub fn level_directive(level: Level) -> Directive {
    let s = format!("{TARGET_PREFIX}={}", level.as_str().to_lowercase());
    Directive::from_str(&s).unwrap_or_else(|_| level.into())
}

/// `EnvFilter` from `RUST_LOG` (or `default`), with `level` applied to this crate.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    base.add_directive(level_directive(level))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_carry_second_precision_rfc3339_timestamps() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .event_format(event_format()),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "service_context::telemetry_check", "hello");
        });

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let ts = out.split_whitespace().next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "{out}");
        assert!(ts.ends_with('Z'));
        assert!(!ts.contains('.'));
        assert!(out.contains("service_context::telemetry_check"));
        assert!(out.contains("hello"));
    }

    #[test]
    fn directive_targets_this_crate() {
        assert_eq!(level_directive(Level::DEBUG).to_string(), "service_context=debug");
    }
}
