// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of test results.
//!
//! The main structure in this module is [`TestReporter`].

use crate::{
    helpers::plural,
    outcome::{Outcome, OutcomeStatus},
    runner::{RunStats, display_elapsed},
    test::TestId,
};
use owo_colors::{OwoColorize, Style};
use std::{fmt, io, time::Duration};

/// An event that occurred during a test run.
#[derive(Clone, Debug)]
pub enum TestEvent<'a> {
    /// The run started.
    RunStarted {
        /// The number of registered suites.
        suite_count: usize,
        /// The number of registered tests across all suites.
        test_count: usize,
    },

    /// A test finished running.
    TestFinished {
        /// The test.
        id: &'a TestId,
        /// Its outcomes, one per subtest. Empty if the test didn't match the filter.
        outcomes: &'a [Outcome],
    },

    /// The run is being canceled.
    RunBeginCancel {
        /// The number of tests still running.
        running: usize,
        /// Why the run is being canceled.
        reason: CancelReason,
    },

    /// The run finished.
    RunFinished {
        /// Statistics for the run.
        stats: RunStats,
        /// How long the run took.
        elapsed: Duration,
    },
}

/// The reason a test run was canceled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// A test hit a configuration error.
    ConfigurationError,
    /// An error occurred while reporting results.
    ReportError,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationError => write!(f, "configuration error"),
            Self::ReportError => write!(f, "reporting error"),
        }
    }
}

/// Writes human-readable test results.
#[derive(Debug, Default)]
pub struct TestReporter {
    styles: Styles,
}

impl TestReporter {
    /// Creates a new reporter that writes plain text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes `event` to `writer`.
    pub fn write_event(&self, event: &TestEvent<'_>, mut writer: impl io::Write) -> io::Result<()> {
        let styles = &self.styles;
        match event {
            TestEvent::RunStarted {
                suite_count,
                test_count,
            } => {
                writeln!(
                    writer,
                    "{:>12} {} {} across {} {}",
                    "Starting".style(styles.pass),
                    test_count.style(styles.count),
                    plural::tests_str(*test_count),
                    suite_count.style(styles.count),
                    plural::suites_str(*suite_count),
                )?;
            }
            TestEvent::TestFinished { id, outcomes } => {
                for outcome in *outcomes {
                    self.write_outcome(id, outcome, &mut writer)?;
                }
            }
            TestEvent::RunBeginCancel { running, reason } => {
                writeln!(
                    writer,
                    "{:>12} due to {}: {} {} still running",
                    "Canceling".style(styles.fail),
                    reason,
                    running.style(styles.count),
                    plural::tests_str(*running),
                )?;
            }
            TestEvent::RunFinished { stats, elapsed } => {
                let summary_style = if stats.is_success() {
                    styles.pass
                } else {
                    styles.fail
                };
                write!(
                    writer,
                    "{:>12} [{:>9}] {} {} run: {} passed",
                    "Summary".style(summary_style),
                    display_elapsed(*elapsed),
                    stats.outcome_count.style(styles.count),
                    plural::tests_str(stats.outcome_count),
                    stats.passed.style(styles.pass),
                )?;
                for (count, what, style) in [
                    (stats.failed, "failed", styles.fail),
                    (stats.unexpected_successes, "unexpectedly passed", styles.fail),
                    (stats.expected_failures, "known failures", styles.skip),
                    (stats.skipped, "skipped", styles.skip),
                ] {
                    if count > 0 {
                        write!(writer, ", {} {what}", count.style(style))?;
                    }
                }
                let canceled = stats.initial_run_count - stats.finished_count;
                if canceled > 0 {
                    write!(writer, " ({} not run)", canceled.style(styles.count))?;
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    fn write_outcome(
        &self,
        id: &TestId,
        outcome: &Outcome,
        mut writer: impl io::Write,
    ) -> io::Result<()> {
        let styles = &self.styles;
        let (label_style, detail) = match &outcome.status {
            OutcomeStatus::Success => (styles.pass, None),
            OutcomeStatus::Failure { .. } => (styles.fail, None),
            OutcomeStatus::Skipped { reason } => (styles.skip, Some(reason.clone())),
            OutcomeStatus::ExpectedFailure { label, bug } => (
                styles.skip,
                Some(format!("known failure for {label} ({bug})")),
            ),
            OutcomeStatus::UnexpectedSuccess { label, bug } => (
                styles.fail,
                Some(format!("unexpected success for {label} ({bug})")),
            ),
        };

        write!(writer, "{:>12} ", outcome.status.label().style(label_style))?;
        if let Some(suite) = &id.suite {
            write!(writer, "{}/", suite.style(styles.suite))?;
        }
        write!(writer, "{}", outcome.name.style(styles.name))?;
        if let Some(abi) = id.abi {
            write!(writer, " [{abi}]")?;
        }
        if let Some(detail) = detail {
            write!(writer, ": {detail}")?;
        }
        writeln!(writer)?;

        if let OutcomeStatus::Failure { message } = &outcome.status {
            for line in message.lines() {
                writeln!(writer, "    {}", line.style(styles.fail_output))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    suite: Style,
    name: Style,
    fail_output: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.suite = Style::new().magenta().bold();
        self.name = Style::new().blue().bold();
        self.fail_output = Style::new().magenta();
    }
}
