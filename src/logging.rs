//! Console logging.
//!
//! All log lines go to stdout as `[HH:MM:SS] message` in local time.
//! Warnings and errors carry a level label after the stamp.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Event formatter producing the `[HH:MM:SS] message` layout.
pub struct ClockFormat;

impl<S, N> FormatEvent<S, N> for ClockFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[{}] ", clock())?;
        let level = *event.metadata().level();
        if level == Level::ERROR || level == Level::WARN {
            write!(writer, "{}: ", level)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .event_format(ClockFormat)
        .try_init();
}

/// Prefixes `message` with the same clock stamp used by log lines.
pub fn stamp(message: &str) -> String {
    format!("[{}] {}", clock(), message)
}

fn clock() -> String {
    chrono::Local::now().format(CLOCK_FORMAT).to_string()
}
