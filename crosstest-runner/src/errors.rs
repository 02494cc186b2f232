// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by crosstest.
//!
//! Failures of a single test's build or run never show up here: they are folded into an
//! [`Outcome`](crate::outcome::Outcome) where they happen. The types in this module describe
//! problems with the corpus, the configuration or the infrastructure, and abort discovery or
//! the run.

use crate::{target::Abi, test::TestId};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the runner config.
#[derive(Debug, Error)]
#[error("failed to parse crosstest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the runner config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    /// The input that failed to parse.
    pub input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing an [`Abi`] from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized ABI: {input}\n(known values: {})",
    Abi::ALL.iter().map(|abi| abi.as_str()).collect::<Vec<_>>().join(", "),
)]
pub struct AbiParseError {
    input: String,
}

impl AbiParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while building a [`TestFilter`](crate::test_filter::TestFilter).
#[derive(Clone, Debug, Error)]
#[error("invalid test filter `{pattern}`: {message}")]
pub struct TestFilterParseError {
    pattern: String,
    message: String,
}

impl TestFilterParseError {
    pub(crate) fn new(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}

/// An error in a per-test policy file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyParseError {
    /// The file could not be parsed as a policy.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// A broken rule did not name a bug.
    #[error("rule #{index} in `{section}` is missing a `bug` entry")]
    MissingBug {
        /// The section containing the rule.
        section: &'static str,
        /// The one-based index of the rule within its section.
        index: usize,
    },

    /// An unsupported rule named a bug, which only broken rules track.
    #[error("rule #{index} in `{section}` has a `bug` entry, but only broken rules track bugs")]
    UnexpectedBug {
        /// The section containing the rule.
        section: &'static str,
        /// The one-based index of the rule within its section.
        index: usize,
    },
}

/// A problem with the test corpus or its configuration.
///
/// These are detected at discovery or dispatch time and abort the run instead of producing a
/// per-test result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The test directory does not exist or is not a directory.
    #[error("test directory `{dir}` does not exist")]
    MissingTestDir {
        /// The directory that was expected.
        dir: Utf8PathBuf,
    },

    /// A test directory name could not be used as a test name.
    #[error("cannot derive a test name from `{dir}`: {reason}")]
    InvalidTestName {
        /// The directory the name was derived from.
        dir: Utf8PathBuf,
        /// Why the directory name can't be used.
        reason: &'static str,
    },

    /// A script-fixture test has no interpreter script.
    #[error("{test} is missing its test script: {path}")]
    MissingScript {
        /// The name of the test.
        test: String,
        /// The script that was expected.
        path: Utf8PathBuf,
    },

    /// A fixture input has no paired golden output.
    #[error("{test} is missing golden output: {path}")]
    MissingGolden {
        /// The name of the test.
        test: String,
        /// The golden file that was expected.
        path: Utf8PathBuf,
    },

    /// A device test has neither an ndk-build nor a CMake project.
    #[error("device test {test} has neither jni/Android.mk nor CMakeLists.txt")]
    NoDeviceBuild {
        /// The name of the test.
        test: String,
    },

    /// The manifest declared a platform that could not be understood.
    #[error("invalid APP_PLATFORM `{value}` in {path}")]
    InvalidManifestPlatform {
        /// The manifest file.
        path: Utf8PathBuf,
        /// The value found in it.
        value: String,
    },

    /// The policy file could not be read.
    #[error("failed to read policy file {path}")]
    PolicyRead {
        /// The policy file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The policy file exists but is malformed.
    #[error("failed to parse policy file {path}")]
    PolicyParse {
        /// The policy file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: PolicyParseError,
    },

    /// A required tool was not configured.
    #[error("tool `{tool}` is not configured (set `{key}` in the crosstest config)")]
    ToolNotConfigured {
        /// The tool that was needed.
        tool: &'static str,
        /// The config key that provides it.
        key: &'static str,
    },

    /// The test directory could not be read.
    #[error("failed to read test directory {dir}")]
    ReadTestDir {
        /// The directory.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The built products could not be deployed.
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

/// A local problem found while planning a device deployment, before any device call is made.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeploymentError {
    /// The build left no products for the active architecture.
    #[error("{test}: no libraries for {abi} in {dir}")]
    NoProducts {
        /// The name of the test.
        test: String,
        /// The active architecture.
        abi: Abi,
        /// The directory that was expected to hold the products.
        dir: Utf8PathBuf,
    },

    /// After filtering, nothing is left to execute.
    #[error("{test}: could not find any test executables in {dir}")]
    NoExecutables {
        /// The name of the test.
        test: String,
        /// The product directory that was searched.
        dir: Utf8PathBuf,
    },

    /// The product directory could not be listed.
    #[error("{test}: failed to read products in {dir}")]
    ReadProducts {
        /// The name of the test.
        test: String,
        /// The product directory.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error reported by a [`Device`](crate::device::Device).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// The host-side transport command could not be executed.
    #[error("failed to execute `{command}`")]
    Exec {
        /// The command that was run.
        command: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A checked remote command exited with a nonzero status.
    #[error("`{command}` failed with exit code {exit_code}:\n{output}")]
    CommandFailed {
        /// The remote command.
        command: String,
        /// The remote exit code.
        exit_code: i32,
        /// Combined output of the command.
        output: String,
    },

    /// A file push failed.
    #[error("failed to push {local} to {remote_dir}:\n{output}")]
    PushFailed {
        /// The local file.
        local: Utf8PathBuf,
        /// The remote directory.
        remote_dir: String,
        /// Output of the transport.
        output: String,
    },

    /// The transport did not report the remote exit status.
    #[error("could not determine the exit status of `{command}`:\n{stderr}")]
    MissingExitStatus {
        /// The remote command.
        command: String,
        /// Standard error of the transport.
        stderr: String,
    },

    /// The device reported an API level that is not a number.
    #[error("device reported an invalid API level `{value}`")]
    InvalidApiLevel {
        /// The value the device reported.
        value: String,
    },
}

/// An error that occurred while registering a suite.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A suite with this name was already registered.
    #[error("suite `{name}` already exists")]
    DuplicateSuite {
        /// The name of the suite.
        name: String,
    },

    /// The suite root could not be scanned.
    #[error("failed to scan suite `{suite}` at {root}")]
    ScanRoot {
        /// The name of the suite.
        suite: String,
        /// The root directory of the suite.
        root: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A directory under the suite root is not valid UTF-8.
    #[error("suite `{suite}` contains a non-UTF-8 path: {}", .path.display())]
    NonUtf8Path {
        /// The name of the suite.
        suite: String,
        /// The offending path.
        path: std::path::PathBuf,
    },

    /// A test in the suite could not be constructed.
    #[error("failed to load test in suite `{suite}`")]
    Test {
        /// The name of the suite.
        suite: String,
        /// The underlying error.
        #[source]
        error: ConfigurationError,
    },
}

/// An error that occurred while creating a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// The worker pool could not be started.
    #[error("failed to start the worker pool")]
    ThreadPoolBuild(#[source] rayon::ThreadPoolBuildError),
}

/// A run-fatal error returned by [`TestRunner::try_execute`](crate::runner::TestRunner::try_execute).
#[derive(Debug)]
pub enum RunError<E> {
    /// A test hit a configuration error while running. The run was canceled.
    Configuration {
        /// The test that failed.
        id: TestId,
        /// The underlying error.
        error: ConfigurationError,
    },

    /// The event callback returned an error. The run was canceled.
    Callback(E),
}

impl<E: fmt::Display> fmt::Display for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { id, .. } => write!(f, "configuration error while running {id}"),
            Self::Callback(error) => write!(f, "error while reporting results: {error}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RunError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration { error, .. } => Some(error),
            Self::Callback(error) => Some(error),
        }
    }
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
