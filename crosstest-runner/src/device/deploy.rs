// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Device;
use crate::{
    errors::{DeploymentError, DisplayErrorChain},
    outcome::Outcome,
    policy::KnownBroken,
    target::Abi,
    test_filter::TestFilter,
};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

/// Build products that are never pushed to the device.
const IGNORED_PRODUCTS: &[&str] = &["gdbserver", "gdb.setup"];

/// Per-case policy decisions made while running on a device.
pub trait RunChecks {
    /// Returns a label if `case` should not be run on the device.
    fn check_run_unsupported(&self, case: &str) -> Option<String>;

    /// Returns the broken configuration if `case` is known to fail on the device.
    fn check_run_broken(&self, case: &str) -> Option<KnownBroken>;
}

/// The products of one build, as they will be pushed to the device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentPlan {
    product_dir: Utf8PathBuf,
    libraries: Vec<String>,
    executables: Vec<String>,
}

impl DeploymentPlan {
    /// Plans the deployment of the products built in `build_dir` for `abi`.
    ///
    /// Shared libraries are always deployed. Executables are test cases and are only deployed
    /// if `filter` selects `<test_name>.<case>`. Anything that isn't a file is ignored. This never
    /// touches the device.
    pub fn new(
        test_name: &str,
        abi: Abi,
        build_dir: &Utf8Path,
        filter: &TestFilter,
    ) -> Result<Self, DeploymentError> {
        let product_dir = build_dir.join("libs").join(abi.as_str());
        if !product_dir.is_dir() {
            return Err(DeploymentError::NoProducts {
                test: test_name.to_owned(),
                abi,
                dir: product_dir,
            });
        }

        let read_error = |error: std::io::Error| DeploymentError::ReadProducts {
            test: test_name.to_owned(),
            dir: product_dir.clone(),
            error,
        };
        let mut libraries = Vec::new();
        let mut executables = Vec::new();
        for entry in product_dir.read_dir_utf8().map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            let file_name = entry.file_name();
            if IGNORED_PRODUCTS.contains(&file_name) || !entry.path().is_file() {
                continue;
            }
            if file_name.ends_with(".so") {
                libraries.push(file_name.to_owned());
            } else if filter.matches(&format!("{test_name}.{file_name}")) {
                executables.push(file_name.to_owned());
            }
        }

        if executables.is_empty() {
            return Err(DeploymentError::NoExecutables {
                test: test_name.to_owned(),
                dir: product_dir,
            });
        }
        libraries.sort_unstable();
        executables.sort_unstable();

        Ok(Self {
            product_dir,
            libraries,
            executables,
        })
    }

    /// Returns the names of the shared libraries to push.
    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    /// Returns the names of the test executables to push and run, in the order they run.
    pub fn executables(&self) -> &[String] {
        &self.executables
    }
}

/// Pushes a planned build to a device, runs its cases and cleans up after itself.
#[derive(Debug)]
pub struct Deployment<'a> {
    device: &'a dyn Device,
    test_name: &'a str,
    remote_dir: String,
    plan: DeploymentPlan,
}

impl<'a> Deployment<'a> {
    /// Creates a new deployment of `plan` into `remote_dir` on `device`.
    pub fn new(
        device: &'a dyn Device,
        test_name: &'a str,
        remote_dir: impl Into<String>,
        plan: DeploymentPlan,
    ) -> Self {
        Self {
            device,
            test_name,
            remote_dir: remote_dir.into(),
            plan,
        }
    }

    /// Runs the deployment.
    ///
    /// Returns one outcome per case, in name order. If the device fails while setting up, the
    /// only outcome is a failure of the whole test. If it fails while running a case, that case
    /// fails and no further cases are run.
    ///
    /// The remote directory is removed exactly once before this returns, including when a
    /// check panics.
    pub fn run(&self, checks: &dyn RunChecks) -> Vec<Outcome> {
        let _guard = RemoteDirGuard {
            device: self.device,
            dir: &self.remote_dir,
        };

        if let Err(message) = self.setup() {
            return vec![Outcome::failure(self.test_name, message)];
        }

        let dir = shell_words::quote(&self.remote_dir);
        let mut outcomes = Vec::with_capacity(self.plan.executables.len());
        for case in &self.plan.executables {
            let case_name = format!("{}.{case}", self.test_name);
            if let Some(label) = checks.check_run_unsupported(case) {
                outcomes.push(Outcome::unsupported(case_name, &label));
                continue;
            }

            let command = format!(
                "cd {dir} && LD_LIBRARY_PATH={dir} ./{} 2>&1",
                shell_words::quote(case)
            );
            match self.device.shell_unchecked(&command) {
                Ok(output) => {
                    let outcome = if output.success() {
                        Outcome::success(case_name)
                    } else {
                        Outcome::failure(case_name, output.stdout)
                    };
                    outcomes.push(outcome.fixup(checks.check_run_broken(case).as_ref()));
                }
                Err(error) => {
                    outcomes.push(Outcome::failure(
                        case_name,
                        format!("device error: {}", DisplayErrorChain::new(&error)),
                    ));
                    break;
                }
            }
        }
        outcomes
    }

    fn setup(&self) -> Result<(), String> {
        let dir = shell_words::quote(&self.remote_dir);
        self.device
            .shell_checked(&format!("rm -rf {dir} && mkdir -p {dir}"))
            .map_err(|error| {
                format!(
                    "failed to create {}: {}",
                    self.remote_dir,
                    DisplayErrorChain::new(&error)
                )
            })?;

        for library in &self.plan.libraries {
            self.push(library)?;
        }
        for executable in &self.plan.executables {
            self.push(executable)?;
            // Products built on some hosts are pushed without execute permissions. Older
            // devices don't support `chmod +x`.
            let remote_path = format!("{}/{executable}", self.remote_dir);
            self.device
                .shell_checked(&format!("chmod 777 {}", shell_words::quote(&remote_path)))
                .map_err(|error| {
                    format!(
                        "failed to make {remote_path} executable: {}",
                        DisplayErrorChain::new(&error)
                    )
                })?;
        }
        Ok(())
    }

    fn push(&self, file_name: &str) -> Result<(), String> {
        let local = self.plan.product_dir.join(file_name);
        debug!("pushing {local} to {}", self.remote_dir);
        self.device
            .push(&local, &self.remote_dir)
            .map_err(|error| format!("{}", DisplayErrorChain::new(&error)))
    }
}

/// Removes the remote directory when dropped.
struct RemoteDirGuard<'a> {
    device: &'a dyn Device,
    dir: &'a str,
}

impl Drop for RemoteDirGuard<'_> {
    fn drop(&mut self) {
        let command = format!("rm -r {}", shell_words::quote(self.dir));
        match self.device.shell_unchecked(&command) {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(
                "failed to clean up {} on device (exit code {}): {}",
                self.dir, output.exit_code, output.stdout
            ),
            Err(error) => warn!(
                "failed to clean up {} on device: {}",
                self.dir,
                DisplayErrorChain::new(&error)
            ),
        }
    }
}
