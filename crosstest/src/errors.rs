// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use crosstest_runner::{errors::*, test::TestId};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for crosstest.
pub enum CrosstestExitCode {}

impl CrosstestExitCode {
    /// No errors occurred and crosstest exited normally.
    pub const OK: i32 = 0;

    /// No tests produced any outcomes.
    pub const NO_TESTS_RUN: i32 = 4;

    /// Setting up the run failed: configuration, discovery or the device probe.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed or passed unexpectedly.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The run was aborted by a configuration error found while running a test.
    pub const RUN_ABORTED: i32 = 104;

    /// Writing results to stdout failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// The #[error()] strings are placeholders: the expected way to print out errors is with the
// display_to_stderr method, which colorizes them.

/// An error that crosstest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("suite configuration error")]
    SuiteConfigurationError {
        suite: &'static str,
        #[source]
        err: ConfigurationError,
    },
    #[error("tests directory not found")]
    TestsDirNotFound { dir: Utf8PathBuf },
    #[error("device probe failed")]
    DeviceProbeError {
        #[from]
        err: DeviceError,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("test filter error")]
    TestFilterParseError {
        #[from]
        err: TestFilterParseError,
    },
    #[error("run aborted")]
    RunAborted {
        id: TestId,
        #[source]
        err: ConfigurationError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
    #[error("no tests to run")]
    NoTestsRun,
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::SuiteConfigurationError { .. }
            | Self::TestsDirNotFound { .. }
            | Self::DeviceProbeError { .. }
            | Self::TestRunnerBuildError { .. }
            | Self::DiscoveryError { .. }
            | Self::TestFilterParseError { .. } => CrosstestExitCode::SETUP_ERROR,
            Self::RunAborted { .. } => CrosstestExitCode::RUN_ABORTED,
            Self::WriteOutputError { .. } => CrosstestExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => CrosstestExitCode::TEST_RUN_FAILED,
            Self::NoTestsRun => CrosstestExitCode::NO_TESTS_RUN,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse crosstest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::SuiteConfigurationError { suite, err } => {
                error!("cannot run the {} suite", suite.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::TestsDirNotFound { dir } => {
                error!("tests directory `{}` not found", dir.style(styles.bold));
                None
            }
            Self::DeviceProbeError { err } => {
                error!("failed to query the device");
                Some(err as &dyn Error)
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::DiscoveryError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestFilterParseError { err } => {
                error!("{err}");
                None
            }
            Self::RunAborted { id, err } => {
                error!(
                    "run aborted by a configuration error in `{}`",
                    id.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("error writing test results");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::NoTestsRun => {
                error!("no tests to run");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
