// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device tests against a fake `adb` that runs commands on the host.

use crate::fixtures::*;
use camino::Utf8PathBuf;
use color_eyre::eyre::{Result, ensure};
use crosstest_runner::{
    config::TestThreads,
    device::{AdbDevice, DeviceTarget},
    errors::{ConfigurationError, DeploymentError, RunError},
    outcome::{Outcome, OutcomeStatus},
    runner::{TestRunner, TestRunnerBuilder},
    target::{Abi, BuildTarget},
    test::{BuildTools, Test},
    test_filter::TestFilter,
};
use indoc::{formatdoc, indoc};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// A host directory standing in for a device, along with the tools that drive it.
struct FakeDevice {
    tree: TestTree,
    adb: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    log: Utf8PathBuf,
}

impl FakeDevice {
    fn new() -> Result<Self> {
        let tree = TestTree::new()?;
        let bin = tree.mkdir("bin")?;
        let work_dir = tree.mkdir("remote")?;
        let log = tree.join("adb.log");

        tree.write_script("bin/getprop", "#!/bin/sh\necho 23\n")?;
        let adb = tree.write_script(
            "bin/adb",
            &formatdoc! {r#"
                #!/bin/sh
                echo "$@" >> '{log}'
                case "$1" in
                  push) cp "$2" "$3"/ ;;
                  shell) PATH='{bin}':"$PATH" exec sh -c "$2" ;;
                  *) echo "unknown command: $1" >&2; exit 1 ;;
                esac
            "#,
                log = log,
                bin = bin,
            },
        )?;

        // A fake ndk-build that produces products for whatever ABI it's asked to build.
        tree.write_script(
            "ndk/ndk-build",
            indoc! {r#"
                #!/bin/sh
                for arg in "$@"; do
                  case "$arg" in
                    APP_ABI=*) abi="${arg#APP_ABI=}" ;;
                  esac
                done
                test -f jni/products || exit 0
                mkdir -p "libs/$abi"
                while read -r name status; do
                  printf '#!/bin/sh\necho %s output\nexit %s\n' "$name" "$status" > "libs/$abi/$name"
                done < jni/products
                touch "libs/$abi/libshared.so" "libs/$abi/gdbserver" "libs/$abi/gdb.setup"
            "#},
        )?;

        Ok(Self {
            tree,
            adb,
            work_dir,
            log,
        })
    }

    fn device_target(&self) -> Result<DeviceTarget> {
        let device = AdbDevice::new(self.adb.as_str(), None);
        let api_level = device.api_level()?;
        Ok(DeviceTarget::new(Arc::new(device), api_level).with_work_dir(self.work_dir.as_str()))
    }

    fn build_tools(&self) -> Arc<BuildTools> {
        Arc::new(BuildTools {
            ndk_root: self.tree.join("ndk"),
            cmake: "crosstest-nonexistent-cmake".to_owned(),
            ninja: "crosstest-nonexistent-ninja".to_owned(),
            bash: "bash".to_owned(),
        })
    }

    /// Writes a device test whose build produces one executable per `(name, exit status)`.
    fn write_test(&self, name: &str, products: &[(&str, u8)], policy: Option<&str>) -> Result<()> {
        let products: String = products
            .iter()
            .map(|(product, status)| format!("{product} {status}\n"))
            .collect();
        self.tree.write(&format!("device/{name}/jni/Android.mk"), "")?;
        self.tree
            .write(&format!("device/{name}/jni/products"), &products)?;
        if let Some(policy) = policy {
            self.tree
                .write(&format!("device/{name}/test_config.toml"), policy)?;
        }
        Ok(())
    }

    fn runner(&self, device: &DeviceTarget) -> Result<TestRunner> {
        let tools = self.build_tools();
        let target = BuildTarget::new(Abi::X86, "clang");
        let mut runner = TestRunnerBuilder::default()
            .set_test_threads(TestThreads::Count(2))
            .build()?;
        runner.register_suite("device", &self.tree.join("device"), |dir| {
            Test::device_from_directory(dir, &target, &tools, device)
        })?;
        Ok(runner)
    }

    fn adb_log(&self) -> Result<String> {
        Ok(fs_err::read_to_string(&self.log)?)
    }
}

#[test]
fn device_api_level_is_probed() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    let device = fake.device_target()?;
    assert_eq!(device.api_level, 23);
    Ok(())
}

#[test]
fn device_run_classifies_each_case() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    fake.write_test(
        "foo",
        &[
            ("broken_case", 1),
            ("fail_case", 2),
            ("pass_case", 0),
            ("skipped_case", 0),
        ],
        Some(indoc! {r#"
            [[run-broken]]
            subtest = ["broken_case"]
            bug = "b/9"

            [[run-unsupported]]
            subtest = ["skipped_case"]
        "#}),
    )?;
    let device = fake.device_target()?;
    let runner = fake.runner(&device)?;

    let out = fake.tree.mkdir("out")?;
    let (results, _) = execute(&runner, &out, &TestFilter::any())?;
    assert_eq!(
        outcomes_for(&results, "device", "foo"),
        [
            Outcome {
                name: "foo.broken_case".to_owned(),
                status: OutcomeStatus::ExpectedFailure {
                    label: "broken_case".to_owned(),
                    bug: "b/9".to_owned(),
                },
            },
            Outcome::failure("foo.fail_case", "fail_case output\n"),
            Outcome::success("foo.pass_case"),
            Outcome::skipped("foo.skipped_case", "test unsupported for skipped_case"),
        ]
    );

    let remote_dir = fake.work_dir.join("ndk-tests/foo");
    ensure!(!remote_dir.exists(), "remote directory was cleaned up");

    let log = fake.adb_log()?;
    ensure!(!log.contains("gdbserver"), "debugger helpers aren't pushed: {log}");
    ensure!(log.contains("libshared.so"), "libraries are pushed: {log}");
    assert_eq!(
        log.lines()
            .filter(|line| line.starts_with("shell rm -r "))
            .count(),
        1,
        "cleanup runs exactly once: {log}"
    );
    Ok(())
}

#[test]
fn broken_build_reclassifies_device_cases() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    fake.write_test(
        "foo",
        &[("fail_case", 1), ("pass_case", 0)],
        Some(indoc! {r#"
            [[build-broken]]
            abi = ["x86"]
            bug = "b/88"
        "#}),
    )?;
    let device = fake.device_target()?;
    let runner = fake.runner(&device)?;

    let out = fake.tree.mkdir("out")?;
    let (results, output) = execute_reported(&runner, &out, &TestFilter::any())?;
    assert_eq!(
        outcomes_for(&results, "device", "foo"),
        [
            Outcome {
                name: "foo.fail_case".to_owned(),
                status: OutcomeStatus::ExpectedFailure {
                    label: "x86".to_owned(),
                    bug: "b/88".to_owned(),
                },
            },
            Outcome {
                name: "foo.pass_case".to_owned(),
                status: OutcomeStatus::UnexpectedSuccess {
                    label: "x86".to_owned(),
                    bug: "b/88".to_owned(),
                },
            },
        ]
    );
    ensure!(
        output.contains("  KNOWN FAIL device/foo.fail_case [x86]: known failure for x86 (b/88)\n"),
        "output:\n{output}"
    );
    ensure!(
        output.contains(" SHOULD FAIL device/foo.pass_case [x86]: unexpected success for x86 (b/88)\n"),
        "output:\n{output}"
    );
    ensure!(
        !results.stats.is_success(),
        "an unexpected success fails the run: {:?}",
        results.stats
    );
    Ok(())
}

#[test]
fn subtests_are_filtered() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    fake.write_test("foo", &[("one", 0), ("two", 1)], None)?;
    let device = fake.device_target()?;
    let runner = fake.runner(&device)?;

    let out = fake.tree.mkdir("out")?;
    let (results, _) = execute(&runner, &out, &TestFilter::new(["foo.one"])?)?;
    assert_eq!(
        outcomes_for(&results, "device", "foo"),
        [Outcome::success("foo.one")]
    );
    ensure!(
        !fake.adb_log()?.contains("/two"),
        "filtered-out cases aren't pushed"
    );
    Ok(())
}

#[test]
fn skip_run_only_builds() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    fake.write_test("foo", &[("one", 0)], None)?;
    let device = fake.device_target()?.with_skip_run(true);
    let runner = fake.runner(&device)?;
    // Probing the API level is the only device interaction so far.
    let probe_log = fake.adb_log()?;

    let out = fake.tree.mkdir("out")?;
    let (results, _) = execute(&runner, &out, &TestFilter::any())?;
    assert_eq!(
        outcomes_for(&results, "device", "foo"),
        [Outcome::success("foo")]
    );
    assert_eq!(fake.adb_log()?, probe_log, "nothing was run on the device");
    ensure!(out.join("device/foo/ndk-build/libs/x86/one").is_file());
    Ok(())
}

#[test]
fn missing_products_cancel_the_run() -> Result<()> {
    test_init();

    let fake = FakeDevice::new()?;
    // No products file: the build succeeds but produces nothing.
    fake.tree.write("device/empty/jni/Android.mk", "")?;
    let device = fake.device_target()?;
    let runner = fake.runner(&device)?;
    let probe_log = fake.adb_log()?;

    let out = fake.tree.mkdir("out")?;
    let mut canceled = false;
    let err = runner
        .execute(&out, &TestFilter::any(), |event| {
            if let crosstest_runner::reporter::TestEvent::RunBeginCancel { .. } = event {
                canceled = true;
            }
        })
        .unwrap_err();
    ensure!(canceled, "cancellation was reported");

    let RunError::Configuration { id, error } = &err else {
        panic!("expected a configuration error, found {err:?}");
    };
    assert_eq!(id.name, "empty");
    ensure!(
        matches!(
            error,
            ConfigurationError::Deployment(DeploymentError::NoProducts { .. })
        ),
        "error: {error:?}"
    );
    assert_eq!(fake.adb_log()?, probe_log, "the device was never touched");
    Ok(())
}
