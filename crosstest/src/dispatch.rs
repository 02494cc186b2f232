// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::{CrosstestExitCode, Result},
    output::{OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crosstest_runner::{
    config::{RunnerConfig, TestThreads},
    device::DeviceTarget,
    errors::RunError,
    reporter::TestReporter,
    runner::{TestRunner, TestRunnerBuilder},
    target::{Abi, BuildTarget},
    test::Test,
    test_filter::TestFilter,
};
use std::{io::Write, sync::Arc};
use tracing::{debug, info};

/// Builds and runs a cross-compiling toolchain's test corpus.
///
/// Tests live in suite directories under the tests root: `awk` for script fixtures, `build` for
/// build-only tests and `device` for tests that are built and then run on an attached device.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CrosstestApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(subcommand)]
    command: Command,
}

impl CrosstestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<i32> {
        match self.command {
            Command::List(opts) => opts.exec_list(writer),
            Command::Run(opts) => opts.exec(output, writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tests that would be run
    ///
    /// Nothing is built and the device is not contacted.
    List(DiscoveryOpts),

    /// Build and run tests
    ///
    /// Each test is built with the strategy its directory calls for. Device tests are then pushed
    /// to the device and run there. Tests run in parallel, and results are reclassified against
    /// each test's test_config.toml before being reported.
    Run(RunOpts),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, ValueEnum)]
enum SuiteKind {
    Awk,
    Build,
    Device,
}

impl SuiteKind {
    const ALL: &'static [SuiteKind] = &[SuiteKind::Awk, SuiteKind::Build, SuiteKind::Device];

    fn as_str(self) -> &'static str {
        match self {
            Self::Awk => "awk",
            Self::Build => "build",
            Self::Device => "device",
        }
    }
}

#[derive(Debug, Args)]
struct DiscoveryOpts {
    /// ABI to build tests for
    #[arg(long, value_name = "ABI")]
    abi: Abi,

    /// Platform level to build against [default: from each test's Application.mk]
    #[arg(long, value_name = "LEVEL")]
    platform: Option<u32>,

    /// Toolchain to build with
    #[arg(long, default_value = "clang", value_name = "NAME")]
    toolchain: String,

    /// Root directory holding the suites
    #[arg(long, default_value = "tests", value_name = "DIR")]
    tests_dir: Utf8PathBuf,

    /// Suites to run [default: every suite present under the tests root]
    #[arg(long = "suite", value_enum, value_name = "SUITE")]
    suites: Vec<SuiteKind>,

    /// Config file [default: tests-dir/.config/crosstest.toml]
    #[arg(long = "config", value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Extra argument passed to ndk-build and build scripts
    #[arg(long = "ndk-build-flag", value_name = "FLAG", allow_hyphen_values = true)]
    ndk_build_flags: Vec<String>,

    /// Extra argument passed to the CMake configure step
    #[arg(long = "cmake-flag", value_name = "FLAG", allow_hyphen_values = true)]
    cmake_flags: Vec<String>,

    /// Test name filters, of the form `test[.subtest]` with globs in either half
    #[arg(value_name = "FILTERS")]
    filters: Vec<String>,
}

impl DiscoveryOpts {
    fn build_target(&self) -> BuildTarget {
        let mut target = BuildTarget::new(self.abi, self.toolchain.clone());
        if let Some(platform) = self.platform {
            target = target.with_platform(platform);
        }
        target.ndk_build_flags = self.ndk_build_flags.clone();
        target.cmake_flags = self.cmake_flags.clone();
        target
    }

    fn make_config(&self) -> Result<RunnerConfig> {
        Ok(RunnerConfig::from_sources(
            &self.tests_dir,
            self.config_file.as_deref(),
        )?)
    }

    /// Returns the suites to register, in order.
    fn suites(&self) -> Result<Vec<SuiteKind>> {
        if !self.tests_dir.is_dir() {
            return Err(ExpectedError::TestsDirNotFound {
                dir: self.tests_dir.clone(),
            });
        }
        if !self.suites.is_empty() {
            let mut suites = self.suites.clone();
            suites.sort();
            suites.dedup();
            return Ok(suites);
        }
        Ok(SuiteKind::ALL
            .iter()
            .copied()
            .filter(|suite| self.tests_dir.join(suite.as_str()).is_dir())
            .collect())
    }

    /// Registers the selected suites with `runner`.
    ///
    /// `device` is called to obtain the device target the first time a device suite is
    /// registered.
    fn register_suites(
        &self,
        runner: &mut TestRunner,
        config: &RunnerConfig,
        device: impl FnOnce(&RunnerConfig) -> Result<DeviceTarget>,
    ) -> Result<()> {
        let target = self.build_target();
        let mut device = Some(device);

        for suite in self.suites()? {
            let name = suite.as_str();
            let root = self.tests_dir.join(name);
            let suite_error = |err| ExpectedError::SuiteConfigurationError { suite: name, err };

            let count = match suite {
                SuiteKind::Awk => {
                    let tools = config.tools().script_fixture_tools().map_err(suite_error)?;
                    runner.register_suite(name, &root, |dir| {
                        Test::script_fixture_from_directory(dir, &tools)
                    })?
                }
                SuiteKind::Build => {
                    let tools = Arc::new(config.tools().build_tools().map_err(suite_error)?);
                    runner.register_suite(name, &root, |dir| {
                        Test::build_from_directory(dir, &target, &tools)
                    })?
                }
                SuiteKind::Device => {
                    let tools = Arc::new(config.tools().build_tools().map_err(suite_error)?);
                    // The suite list is deduplicated, so this runs at most once.
                    let Some(device) = device.take() else {
                        continue;
                    };
                    let device = device(config)?;
                    runner.register_suite(name, &root, |dir| {
                        Test::device_from_directory(dir, &target, &tools, &device)
                    })?
                }
            };
            debug!("registered {count} tests in suite {name}");
        }
        Ok(())
    }

    fn exec_list(self, writer: &mut dyn Write) -> Result<i32> {
        let config = self.make_config()?;
        let filter = TestFilter::new(&self.filters)?;
        let mut runner = TestRunnerBuilder::default().build()?;
        // Listing never contacts the device, so the API level is left unknown.
        self.register_suites(&mut runner, &config, |config| {
            Ok(unprobed_device_target(config))
        })?;

        let write_list = |writer: &mut dyn Write| -> std::io::Result<()> {
            for (suite, tests) in runner.suites() {
                for test in tests.iter().filter(|test| filter.matches(test.name())) {
                    writeln!(writer, "{}", test.id(Some(suite)))?;
                }
            }
            writer.flush()
        };
        write_list(writer).map_err(|err| ExpectedError::WriteOutputError { err })?;
        Ok(CrosstestExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    discovery: DiscoveryOpts,

    /// Directory build products are written to
    #[arg(long, default_value = "out", value_name = "DIR")]
    out_dir: Utf8PathBuf,

    /// Number of tests to build and run at the same time [default: from config]
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "N",
        allow_negative_numbers = true
    )]
    test_threads: Option<TestThreads>,

    /// Build device tests without running them
    #[arg(long)]
    skip_run: bool,
}

impl RunOpts {
    fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<i32> {
        let config = self.discovery.make_config()?;
        let filter = TestFilter::new(&self.discovery.filters)?;

        let mut builder = TestRunnerBuilder::default();
        builder.set_test_threads(self.test_threads.unwrap_or_else(|| config.test_threads()));
        let mut runner = builder.build()?;

        let skip_run = self.skip_run;
        self.discovery
            .register_suites(&mut runner, &config, |config| {
                if skip_run {
                    return Ok(unprobed_device_target(config).with_skip_run(true));
                }
                let device = config.device().adb_device();
                let api_level = device.api_level()?;
                info!("device API level is {api_level}");
                Ok(DeviceTarget::new(Arc::new(device), api_level)
                    .with_work_dir(config.device().work_dir.clone()))
            })?;

        let mut reporter = TestReporter::new();
        if output.color.should_colorize(supports_color::Stream::Stdout) {
            reporter.colorize();
        }

        let results = runner
            .try_execute(&self.out_dir, &filter, |event| {
                reporter.write_event(&event, &mut *writer)
            })
            .map_err(|err| match err {
                RunError::Configuration { id, error } => ExpectedError::RunAborted { id, err: error },
                RunError::Callback(err) => ExpectedError::WriteOutputError { err },
            })?;
        writer
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        if !results.stats.is_success() {
            Err(ExpectedError::TestRunFailed)
        } else if results.stats.outcome_count == 0 {
            Err(ExpectedError::NoTestsRun)
        } else {
            Ok(CrosstestExitCode::OK)
        }
    }
}

/// A device target for runs that never reach the device.
///
/// The API level is only consulted when tests are run on the device, so it is left at 0.
fn unprobed_device_target(config: &RunnerConfig) -> DeviceTarget {
    DeviceTarget::new(Arc::new(config.device().adb_device()), 0)
        .with_work_dir(config.device().work_dir.clone())
}
