//! Console log format for the relay.
//!
//! Lines look like `[2016-03-14 10:22:33.123] [relay               ] [ℹ INFO   ] message`.
//! An event carrying a `component` field is attributed to `relay-<component>`.

use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SERVICE_NAME_WIDTH: usize = 20;
const LOG_LEVEL_WIDTH: usize = 9;

/// Event formatter for the relay console output
pub struct RelayLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl RelayLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: terminal_supports_color(),
        }
    }

    /// Force colours on or off
    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color_enabled = enabled;
        self
    }

    /// Service column, padded or truncated to a fixed width
    fn service_column(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(component) => format!("{}-{}", self.service_name, component),
            None => self.service_name.clone(),
        };

        if name.chars().count() > SERVICE_NAME_WIDTH {
            let head: String = name.chars().take(SERVICE_NAME_WIDTH - 1).collect();
            format!("{}…", head)
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }

    fn level_column(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LOG_LEVEL_WIDTH)
    }

    fn level_color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn paint(&self, color: &'static str) -> &'static str {
        if self.color_enabled {
            color
        } else {
            ""
        }
    }

    fn write_line(
        &self,
        writer: &mut impl fmt::Write,
        timestamp: &str,
        level: &Level,
        fields: &EventFields,
    ) -> fmt::Result {
        writeln!(
            writer,
            "{}[{}] [{}] [{}{}{}] {}{}",
            self.paint(COLOR_CYAN),
            timestamp,
            self.service_column(fields.component.as_deref()),
            self.level_color(level),
            Self::level_column(level),
            self.paint(COLOR_RESET),
            fields.message,
            self.paint(COLOR_RESET),
        )
    }
}

impl<S, N> FormatEvent<S, N> for RelayLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();

        let mut fields = EventFields::default();
        event.record(&mut fields);

        self.write_line(&mut writer, &timestamp, event.metadata().level(), &fields)
    }
}

/// Message and component extracted from an event
#[derive(Default)]
struct EventFields {
    message: String,
    component: Option<String>,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        let unquoted = rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(rendered);
        self.record_str(field, &unquoted);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }
}

fn terminal_supports_color() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => false,
    }
}
