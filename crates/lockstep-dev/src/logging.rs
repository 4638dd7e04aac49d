use std::fmt;

use owo_colors::OwoColorize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Log lines as `LEVEL message`, with the enclosing spans when requested.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LockstepFormat {
    display_level: bool,
    show_spans: bool,
}

impl Default for LockstepFormat {
    fn default() -> Self {
        Self {
            display_level: true,
            show_spans: false,
        }
    }
}

impl LockstepFormat {
    #[must_use]
    pub(crate) fn with_spans(mut self, show_spans: bool) -> Self {
        self.show_spans = show_spans;
        self
    }
}

impl<S, N> FormatEvent<S, N> for LockstepFormat
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
        let ansi = writer.has_ansi_escapes();

        if self.display_level {
            let level = event.metadata().level();
            // Same colors as tracing
            if ansi {
                match *level {
                    Level::TRACE => write!(writer, "{} ", level.purple())?,
                    Level::DEBUG => write!(writer, "{} ", level.blue())?,
                    Level::INFO => write!(writer, "{} ", level.green())?,
                    Level::WARN => write!(writer, "{} ", level.yellow())?,
                    Level::ERROR => write!(writer, "{} ", level.red())?,
                }
            } else {
                write!(writer, "{level} ")?;
            }
        }

        if self.show_spans {
            let span = event
                .parent()
                .and_then(|id| ctx.span(id))
                .or_else(|| ctx.lookup_current());
            let mut seen = false;
            for span in span.into_iter().flat_map(|span| span.scope().from_root()) {
                seen = true;
                if ansi {
                    write!(writer, "{}:", span.metadata().name().bold())?;
                } else {
                    write!(writer, "{}:", span.metadata().name())?;
                }
            }
            if seen {
                writer.write_char(' ')?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
