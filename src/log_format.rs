//! One-line event layout used on stderr.
//!
//! A line reads `LEVEL module: outer:inner: message key=value`, with the
//! `tnc_tracker::` prefix dropped from the module path. Putting the module
//! first keeps the KISS client and the ingest loop lined up when they log
//! under the same span.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const CRATE_PREFIX: &str = "tnc_tracker::";
const RESET: &str = "\x1b[0m";

pub struct CompactFormat {
    ansi: bool,
}

impl CompactFormat {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }

    fn color(level: &Level) -> &'static str {
        match *level {
            Level::ERROR => "\x1b[31m",
            Level::WARN => "\x1b[33m",
            Level::INFO => "\x1b[32m",
            Level::DEBUG => "\x1b[34m",
            Level::TRACE => "\x1b[35m",
        }
    }
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

impl<S, N> FormatEvent<S, N> for CompactFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let level = metadata.level();

        if self.ansi {
            write!(writer, "{}{:>5}{} ", Self::color(level), level, RESET)?;
        } else {
            write!(writer, "{:>5} ", level)?;
        }
        write!(writer, "{}: ", short_target(metadata.target()))?;

        let spans: Vec<&'static str> = ctx
            .event_scope()
            .map(|scope| scope.from_root().map(|span| span.name()).collect())
            .unwrap_or_default();
        if !spans.is_empty() {
            write!(writer, "{}: ", spans.join(":"))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
