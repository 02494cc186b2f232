// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use crosstest_runner::{
    outcome::Outcome,
    reporter::TestReporter,
    runner::{RunResults, TestRunner},
    test_filter::TestFilter,
};
use std::sync::Once;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Ignore the error: another test binary may already have installed a hook.
        let _ = color_eyre::install();
    });
}

/// A temporary directory tree that tests and tools are written into.
pub(crate) struct TestTree {
    dir: Utf8TempDir,
}

impl TestTree {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            dir: camino_tempfile::tempdir()?,
        })
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn join(&self, path: &str) -> Utf8PathBuf {
        self.dir.path().join(path)
    }

    /// Writes `contents` to `path`, creating parent directories.
    pub(crate) fn write(&self, path: &str, contents: &str) -> Result<Utf8PathBuf> {
        let path = self.join(path);
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(&path, contents)?;
        Ok(path)
    }

    /// Writes an executable script to `path`.
    #[cfg(unix)]
    pub(crate) fn write_script(&self, path: &str, contents: &str) -> Result<Utf8PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(path, contents)?;
        fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    pub(crate) fn mkdir(&self, path: &str) -> Result<Utf8PathBuf> {
        let path = self.join(path);
        fs_err::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Runs every test registered with `runner`, collecting events as they're reported.
pub(crate) fn execute(
    runner: &TestRunner,
    out_dir: &Utf8Path,
    filter: &TestFilter,
) -> Result<(RunResults, Vec<String>)> {
    let mut finished = Vec::new();
    let results = runner.execute(out_dir, filter, |event| {
        if let crosstest_runner::reporter::TestEvent::TestFinished { id, .. } = event {
            finished.push(id.to_string());
        }
    })?;
    Ok((results, finished))
}

/// Runs every test registered with `runner`, returning the results and the reporter's output.
pub(crate) fn execute_reported(
    runner: &TestRunner,
    out_dir: &Utf8Path,
    filter: &TestFilter,
) -> Result<(RunResults, String)> {
    let reporter = TestReporter::new();
    let mut output = Vec::new();
    let results = runner.try_execute(out_dir, filter, |event| {
        reporter.write_event(&event, &mut output)
    })?;
    Ok((results, String::from_utf8(output)?))
}

/// Returns the outcomes for the test `name` in `suite`.
pub(crate) fn outcomes_for<'a>(results: &'a RunResults, suite: &str, name: &str) -> &'a [Outcome] {
    results
        .by_test
        .iter()
        .find(|(id, _)| id.suite.as_deref() == Some(suite) && id.name == name)
        .map(|(_, outcomes)| outcomes.as_slice())
        .unwrap_or_else(|| panic!("no results for {suite}/{name}"))
}
