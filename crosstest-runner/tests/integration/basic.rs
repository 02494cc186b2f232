// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use crosstest_runner::{
    config::TestThreads,
    outcome::{Outcome, OutcomeStatus},
    runner::TestRunnerBuilder,
    target::{Abi, BuildTarget},
    test::{BuildTools, Test},
    test_filter::TestFilter,
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_case::test_case;

fn build_tools(tree: &TestTree) -> Arc<BuildTools> {
    Arc::new(BuildTools {
        ndk_root: tree.join("ndk"),
        cmake: "crosstest-nonexistent-cmake".to_owned(),
        ninja: "crosstest-nonexistent-ninja".to_owned(),
        bash: "bash".to_owned(),
    })
}

#[cfg(unix)]
#[test]
fn mips_policy_scenario() -> Result<()> {
    test_init();

    let tree = TestTree::new()?;
    tree.write("build/a/build.sh", "exit 0\n")?;
    tree.write(
        "build/a/test_config.toml",
        indoc! {r#"
            [[build-unsupported]]
            abi = ["mips"]
        "#},
    )?;
    tree.write("build/b/build.sh", "echo 'b does not build' >&2\nexit 1\n")?;
    tree.write(
        "build/b/test_config.toml",
        indoc! {r#"
            [[build-broken]]
            abi = ["mips"]
            bug = "b/123"
        "#},
    )?;
    tree.write("build/c/build.sh", "test \"$APP_ABI\" = mips\n")?;

    let tools = build_tools(&tree);
    let target = BuildTarget::new(Abi::Mips, "clang");
    let mut runner = TestRunnerBuilder::default()
        .set_test_threads(TestThreads::Count(2))
        .build()?;
    runner.register_suite("build", &tree.join("build"), |dir| {
        Test::build_from_directory(dir, &target, &tools)
    })?;

    let out = tree.mkdir("out")?;
    let (results, _) = execute(&runner, &out, &TestFilter::any())?;

    assert_eq!(
        outcomes_for(&results, "build", "a"),
        [Outcome::skipped("a", "test unsupported for mips")]
    );
    assert_eq!(
        outcomes_for(&results, "build", "b"),
        [Outcome {
            name: "b".to_owned(),
            status: OutcomeStatus::ExpectedFailure {
                label: "mips".to_owned(),
                bug: "b/123".to_owned(),
            },
        }]
    );
    assert_eq!(outcomes_for(&results, "build", "c"), [Outcome::success("c")]);

    ensure!(!out.join("build/a").exists(), "unsupported tests are never built");
    ensure!(results.stats.is_success(), "stats: {:?}", results.stats);
    assert_eq!(results.by_suite["build"].len(), 3);
    Ok(())
}

#[cfg(unix)]
#[test]
fn broken_build_outcomes_are_reclassified() -> Result<()> {
    test_init();

    let broken_policy = indoc! {r#"
        [[build-broken]]
        abi = ["x86"]
        bug = "b/77"
    "#};
    let tree = TestTree::new()?;
    tree.write("build/fixed/build.sh", "exit 0\n")?;
    tree.write("build/fixed/test_config.toml", broken_policy)?;
    tree.write("build/still_broken/build.sh", "echo 'link error' >&2\nexit 1\n")?;
    tree.write("build/still_broken/test_config.toml", broken_policy)?;

    let tools = build_tools(&tree);
    let target = BuildTarget::new(Abi::X86, "clang");
    let mut runner = TestRunnerBuilder::default()
        .set_test_threads(TestThreads::Count(2))
        .build()?;
    runner.register_suite("build", &tree.join("build"), |dir| {
        Test::build_from_directory(dir, &target, &tools)
    })?;

    let out = tree.mkdir("out")?;
    let (results, output) = execute_reported(&runner, &out, &TestFilter::any())?;

    let expected_status = |unexpected: bool| {
        let (label, bug) = ("x86".to_owned(), "b/77".to_owned());
        if unexpected {
            OutcomeStatus::UnexpectedSuccess { label, bug }
        } else {
            OutcomeStatus::ExpectedFailure { label, bug }
        }
    };
    assert_eq!(
        outcomes_for(&results, "build", "fixed")[0].status,
        expected_status(true)
    );
    assert_eq!(
        outcomes_for(&results, "build", "still_broken")[0].status,
        expected_status(false)
    );

    ensure!(
        output.contains(" SHOULD FAIL build/fixed [x86]: unexpected success for x86 (b/77)\n"),
        "output:\n{output}"
    );
    ensure!(
        output.contains("  KNOWN FAIL build/still_broken [x86]: known failure for x86 (b/77)\n"),
        "output:\n{output}"
    );
    assert_eq!(results.stats.unexpected_successes, 1);
    assert_eq!(results.stats.expected_failures, 1);
    ensure!(
        !results.stats.is_success(),
        "an unexpected success fails the run: {:?}",
        results.stats
    );
    Ok(())
}

#[test_case(1 ; "one worker")]
#[test_case(4 ; "four workers")]
#[test_case(64 ; "sixty-four workers")]
fn every_test_reports_once(threads: usize) -> Result<()> {
    test_init();

    const TEST_COUNT: usize = 40;
    let tree = TestTree::new()?;
    for i in 0..TEST_COUNT {
        tree.mkdir(&format!("build/test{i:02}"))?;
    }
    for i in 0..5 {
        tree.mkdir(&format!("more/extra{i}"))?;
    }

    // There's no ndk-build under the NDK root, so every build fails without spawning anything.
    let tools = build_tools(&tree);
    let target = BuildTarget::new(Abi::X86, "clang");
    let mut runner = TestRunnerBuilder::default()
        .set_test_threads(TestThreads::Count(threads))
        .build()?;
    for suite in ["build", "more"] {
        runner.register_suite(suite, &tree.join(suite), |dir| {
            Test::build_from_directory(dir, &target, &tools)
        })?;
    }
    assert_eq!(runner.test_count(), TEST_COUNT + 5);

    let out = tree.mkdir("out")?;
    let (results, finished) = execute(&runner, &out, &TestFilter::any())?;

    assert_eq!(finished.len(), TEST_COUNT + 5, "one event per test");
    assert_eq!(results.by_test.len(), TEST_COUNT + 5, "one result list per test");
    for (id, outcomes) in &results.by_test {
        assert_eq!(outcomes.len(), 1, "{id} has one outcome");
        ensure!(outcomes[0].failed(), "{id} failed to build: {:?}", outcomes[0]);
    }
    assert_eq!(results.by_suite["build"].len(), TEST_COUNT);
    assert_eq!(results.by_suite["more"].len(), 5);
    assert_eq!(results.stats.finished_count, TEST_COUNT + 5);
    assert_eq!(results.stats.failed, TEST_COUNT + 5);
    Ok(())
}

#[test]
fn filtered_tests_have_no_outcomes() -> Result<()> {
    test_init();

    let tree = TestTree::new()?;
    tree.mkdir("build/foo")?;
    tree.mkdir("build/bar")?;
    tree.write(
        "build/bar/test_config.toml",
        indoc! {r#"
            [[build-unsupported]]
            toolchain = ["clang"]
        "#},
    )?;

    let tools = build_tools(&tree);
    let target = BuildTarget::new(Abi::X86, "clang");
    let mut runner = TestRunnerBuilder::default()
        .set_test_threads(TestThreads::Count(2))
        .build()?;
    runner.register_suite("build", &tree.join("build"), |dir| {
        Test::build_from_directory(dir, &target, &tools)
    })?;

    let out = tree.mkdir("out")?;
    let (results, finished) = execute(&runner, &out, &TestFilter::new(["b*"])?)?;

    // foo doesn't match the filter: it has a result list, but it's empty.
    assert!(outcomes_for(&results, "build", "foo").is_empty());
    assert_eq!(
        outcomes_for(&results, "build", "bar"),
        [Outcome::skipped("bar", "test unsupported for clang")]
    );
    assert_eq!(finished.len(), 2);
    assert_eq!(results.stats.outcome_count, 1);
    assert_eq!(results.stats.skipped, 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn awk_suite() -> Result<()> {
    test_init();

    let tree = TestTree::new()?;
    tree.write("scripts/upper.awk", "{ print toupper($0) }\n")?;
    tree.write("awk/upper/hello.in", "hello\n")?;
    tree.write("awk/upper/hello.out", "HELLO\n")?;
    tree.write("awk/upper/wrong.in", "world\n")?;
    tree.write("awk/upper/wrong.out", "world\n")?;

    let tools = crosstest_runner::test::ScriptFixtureTools {
        interpreter: "awk".to_owned(),
        scripts_dir: tree.join("scripts"),
    };
    let mut runner = TestRunnerBuilder::default().build()?;
    runner.register_suite("awk", &tree.join("awk"), |dir| {
        Test::script_fixture_from_directory(dir, &tools)
    })?;

    let out = tree.mkdir("out")?;
    let (results, _) = execute(&runner, &out, &TestFilter::any())?;
    let outcomes = outcomes_for(&results, "awk", "upper");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], Outcome::success("upper.hello"));

    let OutcomeStatus::Failure { message } = &outcomes[1].status else {
        panic!("expected a failure, found {:?}", outcomes[1]);
    };
    assert_eq!(outcomes[1].name, "upper.wrong");
    ensure!(
        message.starts_with("output does not match expected:\n\n"),
        "message: {message}"
    );
    ensure!(message.contains("-world"), "message: {message}");
    ensure!(message.contains("+WORLD"), "message: {message}");
    ensure!(!results.stats.is_success());
    ensure!(out.join("awk/upper.hello/hello.out").is_file());
    Ok(())
}

#[test]
fn discovery_errors() -> Result<()> {
    test_init();

    let tree = TestTree::new()?;
    tree.write("awk/orphan/case.in", "")?;
    let tools = crosstest_runner::test::ScriptFixtureTools {
        interpreter: "awk".to_owned(),
        scripts_dir: tree.join("scripts"),
    };

    let mut runner = TestRunnerBuilder::default().build()?;
    let err = runner
        .register_suite("awk", &tree.join("awk"), |dir| {
            Test::script_fixture_from_directory(dir, &tools)
        })
        .unwrap_err();
    let message = crosstest_runner::errors::DisplayErrorChain::new(&err).to_string();
    ensure!(message.contains("orphan"), "message: {message}");
    assert_eq!(runner.suite_count(), 0, "failed suites aren't registered");
    Ok(())
}
