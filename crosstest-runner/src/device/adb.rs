// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Device, ShellOutput};
use crate::errors::DeviceError;
use camino::Utf8Path;
use std::borrow::Cow;
use tracing::debug;

/// Marks the exit status of a remote command in its output.
///
/// Older versions of adb don't propagate the exit status of `adb shell`, so it is echoed after
/// the command and recovered from stdout.
const EXIT_STATUS_SENTINEL: &str = "__crosstest_exit_status:";

/// A device reached through `adb`.
#[derive(Clone, Debug)]
pub struct AdbDevice {
    adb: String,
    serial: Option<String>,
}

impl AdbDevice {
    /// Creates a new `AdbDevice`. If `serial` is `None`, adb picks the only attached device.
    pub fn new(adb: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            adb: adb.into(),
            serial,
        }
    }

    /// Returns the serial number of the device, if one was specified.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Reads the API level of the device.
    pub fn api_level(&self) -> Result<u32, DeviceError> {
        let output = self.shell_checked("getprop ro.build.version.sdk")?;
        let value = output.trim();
        value.parse().map_err(|_| DeviceError::InvalidApiLevel {
            value: value.to_owned(),
        })
    }

    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<Cow<'a, str>> {
        let mut all = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            all.push(Cow::Borrowed("-s"));
            all.push(Cow::Borrowed(serial.as_str()));
        }
        all.extend(args.iter().map(|arg| Cow::Borrowed(*arg)));
        all
    }

    fn display(&self, args: &[Cow<'_, str>]) -> String {
        shell_words::join(std::iter::once(self.adb.as_str()).chain(args.iter().map(|s| &**s)))
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, DeviceError> {
        let args = self.args(args);
        let command_line = self.display(&args);
        debug!("executing command: {command_line}");
        duct::cmd(self.adb.as_str(), args.iter().map(|arg| &**arg))
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|error| DeviceError::Exec {
                command: command_line,
                error,
            })
    }
}

impl Device for AdbDevice {
    fn push(&self, local: &Utf8Path, remote_dir: &str) -> Result<(), DeviceError> {
        let output = self.run(&["push", local.as_str(), remote_dir])?;
        if output.status.success() {
            Ok(())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(DeviceError::PushFailed {
                local: local.to_owned(),
                remote_dir: remote_dir.to_owned(),
                output: combined,
            })
        }
    }

    fn shell_checked(&self, command: &str) -> Result<String, DeviceError> {
        let output = self.shell_unchecked(command)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(DeviceError::CommandFailed {
                command: command.to_owned(),
                exit_code: output.exit_code,
                output: output.stdout + &output.stderr,
            })
        }
    }

    fn shell_unchecked(&self, command: &str) -> Result<ShellOutput, DeviceError> {
        let wrapped = format!("{command}; echo \"{EXIT_STATUS_SENTINEL}$?\"");
        let output = self.run(&["shell", wrapped.as_str()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        match split_exit_status(&stdout) {
            Some((stdout, exit_code)) => Ok(ShellOutput {
                exit_code,
                stdout: stdout.to_owned(),
                stderr,
            }),
            None => Err(DeviceError::MissingExitStatus {
                command: command.to_owned(),
                stderr,
            }),
        }
    }
}

/// Splits the echoed exit status off the end of `stdout`.
fn split_exit_status(stdout: &str) -> Option<(&str, i32)> {
    let index = stdout.rfind(EXIT_STATUS_SENTINEL)?;
    let exit_code = stdout[index + EXIT_STATUS_SENTINEL.len()..]
        .trim()
        .parse()
        .ok()?;
    Some((&stdout[..index], exit_code))
}
