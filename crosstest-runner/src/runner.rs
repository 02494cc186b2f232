// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The parallel test runner.
//!
//! The main structure in this module is [`TestRunner`]. Suites of tests are registered with it,
//! and [`TestRunner::try_execute`] runs every test on a pool of workers, streaming results to a
//! callback as they arrive.

mod work_queue;

pub use work_queue::{Completion, WorkQueue, WorkResult};

use crate::{
    config::TestThreads,
    errors::{ConfigurationError, DiscoveryError, RunError, TestRunnerBuildError},
    outcome::{Outcome, OutcomeStatus},
    reporter::{CancelReason, TestEvent},
    test::{Test, TestId},
    test_filter::TestFilter,
};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Builder for [`TestRunner`].
#[derive(Clone, Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
}

impl TestRunnerBuilder {
    /// Sets the number of tests to run simultaneously. Defaults to the number of logical CPUs.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Creates a new test runner and starts its workers.
    pub fn build(&self) -> Result<TestRunner, TestRunnerBuildError> {
        let test_threads = self
            .test_threads
            .unwrap_or(TestThreads::NumCpus)
            .compute();
        let pool = ThreadPoolBuilder::new()
            .num_threads(test_threads)
            .thread_name(|idx| format!("crosstest-run-{idx}"))
            .build()
            .map_err(TestRunnerBuildError::ThreadPoolBuild)?;
        debug!("started {test_threads} test workers");
        Ok(TestRunner {
            test_threads,
            pool: Arc::new(pool),
            suites: BTreeMap::new(),
        })
    }
}

/// Context for running tests.
///
/// Created with a [`TestRunnerBuilder`].
#[derive(Debug)]
pub struct TestRunner {
    test_threads: usize,
    pool: Arc<ThreadPool>,
    suites: BTreeMap<String, Vec<Arc<Test>>>,
}

impl TestRunner {
    /// Returns the number of tests run simultaneously.
    pub fn test_threads(&self) -> usize {
        self.test_threads
    }

    /// Registers a suite named `name` whose tests are the immediate subdirectories of `root`.
    ///
    /// `ctor` is called once per subdirectory, in name order. Returns the number of tests in the
    /// suite.
    pub fn register_suite<F>(
        &mut self,
        name: impl Into<String>,
        root: &Utf8Path,
        mut ctor: F,
    ) -> Result<usize, DiscoveryError>
    where
        F: FnMut(&Utf8Path) -> Result<Test, ConfigurationError>,
    {
        let name = name.into();
        if self.suites.contains_key(&name) {
            return Err(DiscoveryError::DuplicateSuite { name });
        }

        let tests = scan_suite(&name, root)?
            .iter()
            .map(|dir| {
                ctor(dir).map(Arc::new).map_err(|error| DiscoveryError::Test {
                    suite: name.clone(),
                    error,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("registered suite `{name}` with {} tests", tests.len());

        let count = tests.len();
        self.suites.insert(name, tests);
        Ok(count)
    }

    /// Iterates over registered suites and their tests, in suite name order.
    pub fn suites(&self) -> impl Iterator<Item = (&str, &[Arc<Test>])> + '_ {
        self.suites
            .iter()
            .map(|(name, tests)| (name.as_str(), tests.as_slice()))
    }

    /// Returns the number of registered suites.
    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    /// Returns the number of registered tests across all suites.
    pub fn test_count(&self) -> usize {
        self.suites.values().map(Vec::len).sum()
    }

    /// Runs every registered test, writing build products for suite `S` under `out_dir/S`.
    ///
    /// The callback is called with each event as it happens.
    pub fn execute<F>(
        &self,
        out_dir: &Utf8Path,
        filter: &TestFilter,
        mut callback: F,
    ) -> Result<RunResults, RunError<Infallible>>
    where
        F: FnMut(TestEvent<'_>),
    {
        self.try_execute::<Infallible, _>(out_dir, filter, |event| {
            callback(event);
            Ok(())
        })
    }

    /// Runs every registered test, writing build products for suite `S` under `out_dir/S`.
    ///
    /// Accepts a callback that is called with each event as it happens. If the callback returns
    /// an error, or a test hits a configuration error, the run is canceled: tests that haven't
    /// started are abandoned, running tests are waited for, and the first error is returned.
    pub fn try_execute<E, F>(
        &self,
        out_dir: &Utf8Path,
        filter: &TestFilter,
        mut callback: F,
    ) -> Result<RunResults, RunError<E>>
    where
        F: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        let start = Instant::now();
        let mut results = RunResults {
            by_suite: self
                .suites
                .keys()
                .map(|suite| (suite.clone(), Vec::new()))
                .collect(),
            by_test: BTreeMap::new(),
            stats: RunStats {
                initial_run_count: self.test_count(),
                ..RunStats::default()
            },
        };

        callback(TestEvent::RunStarted {
            suite_count: self.suite_count(),
            test_count: self.test_count(),
        })
        .map_err(RunError::Callback)?;

        let mut queue = WorkQueue::new(self.pool.clone());
        let filter = Arc::new(filter.clone());
        let mut ids = Vec::with_capacity(self.test_count());
        for (suite, tests) in &self.suites {
            let suite_out_dir = out_dir.join(suite);
            for test in tests {
                ids.push(test.id(Some(suite)));
                let item = WorkItem {
                    test: test.clone(),
                    filter: filter.clone(),
                    out_dir: suite_out_dir.clone(),
                };
                queue.submit(move || item.run());
            }
        }

        let mut first_error = None;
        while let Some(Completion { index, result }) = queue.get_result() {
            let id = &ids[index];
            let outcomes = match result {
                WorkResult::Finished(Ok(outcomes)) => outcomes,
                WorkResult::Finished(Err(error)) => {
                    if first_error.is_none() {
                        cancel(&mut queue, &mut callback, CancelReason::ConfigurationError);
                        first_error = Some(RunError::Configuration {
                            id: id.clone(),
                            error,
                        });
                    }
                    continue;
                }
                WorkResult::Panicked(message) => {
                    vec![Outcome::failure(
                        id.name.clone(),
                        format!("test panicked: {message}"),
                    )]
                }
                WorkResult::Canceled => continue,
            };

            results.stats.on_test_finished(&outcomes);
            if first_error.is_none() {
                let event = TestEvent::TestFinished {
                    id,
                    outcomes: &outcomes,
                };
                if let Err(error) = callback(event) {
                    cancel(&mut queue, &mut callback, CancelReason::ReportError);
                    first_error = Some(RunError::Callback(error));
                }
            }

            if let Some(suite) = &id.suite {
                results
                    .by_suite
                    .entry(suite.clone())
                    .or_default()
                    .extend(outcomes.iter().cloned());
            }
            results.by_test.insert(id.clone(), outcomes);
        }
        queue.join();

        if let Some(error) = first_error {
            return Err(error);
        }

        callback(TestEvent::RunFinished {
            stats: results.stats,
            elapsed: start.elapsed(),
        })
        .map_err(RunError::Callback)?;
        Ok(results)
    }
}

fn cancel<T, E, F>(queue: &mut WorkQueue<T>, callback: &mut F, reason: CancelReason)
where
    T: Send + 'static,
    F: FnMut(TestEvent<'_>) -> Result<(), E>,
{
    // Errors reported while canceling are dropped in favor of the first error.
    let _ = callback(TestEvent::RunBeginCancel {
        running: queue.running(),
        reason,
    });
    queue.terminate();
}

fn scan_suite(suite: &str, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    let scan_error = |error: std::io::Error| DiscoveryError::ScanRoot {
        suite: suite.to_owned(),
        root: root.to_owned(),
        error,
    };

    let mut dirs = Vec::new();
    for entry in root.as_std_path().read_dir().map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        if !entry.file_type().map_err(scan_error)?.is_dir() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| DiscoveryError::NonUtf8Path {
                suite: suite.to_owned(),
                path,
            })?;
        dirs.push(path);
    }
    dirs.sort();
    Ok(dirs)
}

/// One test, owned by the worker that runs it.
struct WorkItem {
    test: Arc<Test>,
    filter: Arc<TestFilter>,
    out_dir: Utf8PathBuf,
}

impl WorkItem {
    fn run(self) -> Result<Vec<Outcome>, ConfigurationError> {
        self.test.run_classified(&self.out_dir, &self.filter)
    }
}

/// The outcomes of a completed run.
#[derive(Clone, Debug, Default)]
pub struct RunResults {
    /// Outcomes grouped by suite. Every registered suite has an entry, even if no outcomes were
    /// produced for it.
    pub by_suite: BTreeMap<String, Vec<Outcome>>,

    /// Outcomes grouped by test. Every registered test has an entry; tests that didn't match the
    /// filter have no outcomes.
    pub by_test: BTreeMap<TestId, Vec<Outcome>>,

    /// Statistics for the run.
    pub stats: RunStats,
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests that were expected to run at the beginning.
    ///
    /// If the run is canceled, this will be more than `finished_count`.
    pub initial_run_count: usize,

    /// The number of tests that finished running.
    pub finished_count: usize,

    /// The number of outcomes produced.
    pub outcome_count: usize,

    /// The number of successes.
    pub passed: usize,

    /// The number of failures.
    pub failed: usize,

    /// The number of skipped tests and subtests.
    pub skipped: usize,

    /// The number of failures that were expected.
    pub expected_failures: usize,

    /// The number of successes of tests that were expected to fail.
    pub unexpected_successes: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success: every test finished, and nothing
    /// failed or unexpectedly passed.
    pub fn is_success(&self) -> bool {
        self.initial_run_count == self.finished_count
            && self.failed == 0
            && self.unexpected_successes == 0
    }

    fn on_test_finished(&mut self, outcomes: &[Outcome]) {
        self.finished_count += 1;
        self.outcome_count += outcomes.len();
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Success => self.passed += 1,
                OutcomeStatus::Failure { .. } => self.failed += 1,
                OutcomeStatus::Skipped { .. } => self.skipped += 1,
                OutcomeStatus::ExpectedFailure { .. } => self.expected_failures += 1,
                OutcomeStatus::UnexpectedSuccess { .. } => self.unexpected_successes += 1,
            }
        }
    }
}

/// Returns how long a run took, rounded to milliseconds for display.
pub(crate) fn display_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}
