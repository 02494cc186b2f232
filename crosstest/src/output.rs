// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging and terminal styling.

use clap::{Args, ValueEnum};
use owo_colors::Style;
use std::{fmt, str::FromStr, sync::Once};
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log lines sent to this target continue the previous message and get no level heading.
pub(crate) const NO_HEADING_TARGET: &str = "crosstest::no_heading";

/// Overrides the log filter, in `target=level` syntax.
const LOG_ENV: &str = "CROSSTEST_LOG";

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "CROSSTEST_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        let output = OutputContext {
            verbose: self.verbose,
            color: self.color,
        };
        output.init_logger();
        output
    }
}

/// How output is written, derived from the command line.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

static INIT_LOGGER: Once = Once::new();

impl OutputContext {
    /// Returns styles for errors written to stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        let mut styles = StderrStyles::default();
        if self.color.should_colorize(supports_color::Stream::Stderr) {
            styles.bold = Style::new().bold();
        }
        styles
    }

    /// Returns the log filter: `env_value` if it's set and nonempty, otherwise everything at
    /// info level, or debug level if verbose.
    fn log_targets(&self, env_value: Option<&str>) -> Result<Targets, <Targets as FromStr>::Err> {
        match env_value {
            Some(value) if !value.is_empty() => value.parse(),
            _ => Ok(Targets::new().with_default(self.default_level())),
        }
    }

    fn default_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }

    fn init_logger(&self) {
        INIT_LOGGER.call_once(|| {
            let env_value = std::env::var(LOG_ENV).ok();
            let targets = match self.log_targets(env_value.as_deref()) {
                Ok(targets) => targets,
                Err(error) => {
                    // The logger isn't set up yet, so this can't go through tracing.
                    eprintln!("warning: ignoring invalid {LOG_ENV}: {error}");
                    Targets::new().with_default(self.default_level())
                }
            };

            let formatter = HeadingFormatter {
                colorize: self.color.should_colorize(supports_color::Stream::Stderr),
            };
            let layer = tracing_subscriber::fmt::layer()
                .event_format(formatter)
                .with_writer(std::io::stderr)
                .with_filter(targets);
            tracing_subscriber::registry().with(layer).init();
        });
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub(crate) enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Formats each event as `level: message`, with no timestamp or target.
struct HeadingFormatter {
    colorize: bool,
}

impl HeadingFormatter {
    fn heading(&self, level: Level) -> impl fmt::Display {
        let (heading, style) = match level {
            Level::ERROR => ("error", Style::new().red().bold()),
            Level::WARN => ("warning", Style::new().yellow().bold()),
            Level::INFO => ("info", Style::new().bold()),
            Level::DEBUG => ("debug", Style::new().bold()),
            Level::TRACE => ("trace", Style::new().dimmed()),
        };
        let style = if self.colorize { style } else { Style::new() };
        style.style(heading)
    }
}

impl<S, N> FormatEvent<S, N> for HeadingFormatter
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
        if metadata.target() != NO_HEADING_TARGET {
            write!(writer, "{}: ", self.heading(*metadata.level()))?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Styles for messages written to stderr outside of logging.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tracing::{error, info, warn};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn output(verbose: bool) -> OutputContext {
        OutputContext {
            verbose,
            color: Color::Never,
        }
    }

    #[test]
    fn log_targets() {
        let targets = output(false).log_targets(None).unwrap();
        assert!(targets.would_enable("crosstest_runner::runner", &Level::INFO));
        assert!(!targets.would_enable("crosstest_runner::runner", &Level::DEBUG));

        let targets = output(true).log_targets(Some("")).unwrap();
        assert!(targets.would_enable("crosstest_runner::runner", &Level::DEBUG));

        let targets = output(false)
            .log_targets(Some("crosstest_runner::device=trace"))
            .unwrap();
        assert!(targets.would_enable("crosstest_runner::device::adb", &Level::TRACE));
        assert!(!targets.would_enable("crosstest_runner::runner", &Level::INFO));

        assert!(output(false).log_targets(Some("crosstest=loud")).is_err());
    }

    #[test]
    fn headings() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(HeadingFormatter { colorize: false })
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            error!("tests directory `tests` not found");
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", "no such file");
            warn!("cleanup failed");
            info!("registered {} tests", 3);
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "error: tests directory `tests` not found\n\
             \nCaused by:\n  no such file\n\
             warning: cleanup failed\n\
             info: registered 3 tests\n"
        );
    }
}
