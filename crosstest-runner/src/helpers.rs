// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for crosstest-runner.

use crate::config::get_num_cpus;
use camino::Utf8Path;
use cp_r::CopyOptions;
use std::{any::Any, borrow::Cow, io};
use tracing::debug;

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "suite" if `count` is 1, otherwise "suites".
    pub fn suites_str(count: usize) -> &'static str {
        if count == 1 { "suite" } else { "suites" }
    }
}

/// The `-j` argument passed to build tools: twice the logical CPU count.
pub(crate) fn jobs_arg() -> String {
    format!("-j{}", get_num_cpus() * 2)
}

/// An external command with its output captured.
#[derive(Clone, Debug)]
pub(crate) struct ToolCommand<'a> {
    program: Cow<'a, str>,
    args: Vec<Cow<'a, str>>,
    envs: Vec<(&'static str, String)>,
    dir: Option<&'a Utf8Path>,
}

/// The result of running a [`ToolCommand`] to completion.
#[derive(Clone, Debug)]
pub(crate) struct ToolOutput {
    pub(crate) success: bool,
    /// Standard output and standard error, interleaved.
    pub(crate) output: String,
}

impl<'a> ToolCommand<'a> {
    pub(crate) fn new(program: impl Into<Cow<'a, str>>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            dir: None,
        }
    }

    pub(crate) fn arg(&mut self, arg: impl Into<Cow<'a, str>>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'a, str>>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn env(&mut self, key: &'static str, value: impl Into<String>) -> &mut Self {
        self.envs.push((key, value.into()));
        self
    }

    pub(crate) fn dir(&mut self, dir: &'a Utf8Path) -> &mut Self {
        self.dir = Some(dir);
        self
    }

    /// Returns the command line, quoted for a POSIX shell.
    pub(crate) fn display(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args).map(|s| &**s))
    }

    fn to_expression(&self) -> duct::Expression {
        let mut expression = duct::cmd(&*self.program, self.args.iter().map(|arg| &**arg));
        for (key, value) in &self.envs {
            expression = expression.env(*key, value);
        }
        if let Some(dir) = self.dir {
            expression = expression.dir(dir.as_std_path());
        }
        expression
    }

    /// Runs the command with standard error merged into standard output.
    ///
    /// A nonzero exit is reported through [`ToolOutput::success`]; only a failure to spawn the
    /// command is an error.
    pub(crate) fn run_combined(&self) -> io::Result<ToolOutput> {
        debug!("executing command: {}", self.display());
        let output = self
            .to_expression()
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;
        Ok(ToolOutput {
            success: output.status.success(),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Recreates `dest` as a copy of `src`: any existing `dest` is removed first.
pub(crate) fn prepare_build_dir(src: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    std::fs::create_dir_all(dest)?;
    CopyOptions::new()
        .copy_tree(src, dest)
        .map_err(|error| io::Error::other(error.to_string()))?;
    Ok(())
}

/// Extracts a message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "(non-string panic payload)".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_build_dir_replaces_contents() {
        let src = camino_tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("jni")).unwrap();
        std::fs::write(src.path().join("jni/Android.mk"), "# mk").unwrap();

        let out = camino_tempfile::tempdir().unwrap();
        let dest = out.path().join("foo");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), "").unwrap();

        prepare_build_dir(src.path(), &dest).unwrap();
        assert!(!dest.join("stale").exists(), "stale files removed");
        assert_eq!(
            std::fs::read_to_string(dest.join("jni/Android.mk")).unwrap(),
            "# mk"
        );
    }

    #[test]
    fn command_display_quotes() {
        let mut command = ToolCommand::new("bash");
        command.arg("build.sh").arg("has space");
        assert_eq!(command.display(), "bash build.sh 'has space'");
    }

    #[test]
    fn panic_messages() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 1");
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static");
    }

    #[cfg(unix)]
    #[test]
    fn run_combined_captures_both_streams() {
        let mut command = ToolCommand::new("sh");
        command.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = command.run_combined().unwrap();
        assert!(!output.success);
        assert!(output.output.contains("out"), "{}", output.output);
        assert!(output.output.contains("err"), "{}", output.output);
    }
}
