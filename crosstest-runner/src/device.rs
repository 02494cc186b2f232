// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Devices that built tests are run on.
//!
//! The [`Device`] trait is the only way the runner talks to a device. Everything the runner
//! does on a device, including the [deployment protocol](Deployment), is composed out of its
//! three primitives.

mod adb;
mod deploy;

pub use adb::AdbDevice;
pub use deploy::{Deployment, DeploymentPlan, RunChecks};

use crate::errors::DeviceError;
use camino::Utf8Path;
use std::{fmt, sync::Arc};

/// The default directory on the device that tests are pushed under.
pub const DEFAULT_WORK_DIR: &str = "/data/local/tmp";

/// A device that test products can be pushed to and run on.
pub trait Device: fmt::Debug + Send + Sync {
    /// Copies the local file `local` into the remote directory `remote_dir`.
    fn push(&self, local: &Utf8Path, remote_dir: &str) -> Result<(), DeviceError>;

    /// Runs `command` with the device's shell, failing if it exits with a nonzero status.
    ///
    /// Returns the command's standard output.
    fn shell_checked(&self, command: &str) -> Result<String, DeviceError>;

    /// Runs `command` with the device's shell and returns its exit status and output.
    ///
    /// A nonzero exit status is not an error. Errors are only returned if the command could
    /// not be run at all.
    fn shell_unchecked(&self, command: &str) -> Result<ShellOutput, DeviceError>;
}

/// The result of a remote command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShellOutput {
    /// The exit status of the remote command.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ShellOutput {
    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The device that device tests run on, along with how to run them.
#[derive(Clone, Debug)]
pub struct DeviceTarget {
    /// The device.
    pub device: Arc<dyn Device>,

    /// The API level of the device.
    pub api_level: u32,

    /// The directory on the device that tests are pushed under.
    pub work_dir: String,

    /// If true, device tests are only built.
    pub skip_run: bool,
}

impl DeviceTarget {
    /// Creates a new `DeviceTarget` with the default work directory.
    pub fn new(device: Arc<dyn Device>, api_level: u32) -> Self {
        Self {
            device,
            api_level,
            work_dir: DEFAULT_WORK_DIR.to_owned(),
            skip_run: false,
        }
    }

    /// Sets the directory on the device that tests are pushed under.
    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Sets whether device tests are only built.
    pub fn with_skip_run(mut self, skip_run: bool) -> Self {
        self.skip_run = skip_run;
        self
    }
}
