// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test override policies.
//!
//! A test directory may contain a `test_config.toml` describing the configurations the test is
//! not expected to pass for. A policy answers five questions; each has a permissive default
//! (never broken, always supported, no extra flags) that applies whenever the policy doesn't
//! say otherwise. Defaults apply per question: a policy that only declares `build-unsupported`
//! rules still answers the other four with the defaults.
//!
//! ```toml
//! extra-build-flags = ["-DANDROID_STL=c++_shared"]
//!
//! [[build-unsupported]]
//! abi = ["mips", "mips64"]
//!
//! [[build-broken]]
//! toolchain = ["4.9"]
//! platform-below = 21
//! bug = "b/123"
//!
//! [[run-broken]]
//! subtest = ["thread_test"]
//! device-api-below = 23
//! bug = "b/456"
//! ```

use crate::{
    errors::{ConfigurationError, PolicyParseError},
    target::{Abi, app_platform},
};
use camino::Utf8Path;
use serde::Deserialize;
use std::{fmt, io, sync::Arc};
use tracing::debug;

/// The name of the per-test policy file.
pub const POLICY_FILE_NAME: &str = "test_config.toml";

/// The parameters of a build-level policy decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildQuery<'a> {
    /// The architecture being built for.
    pub abi: Abi,
    /// The platform level being built against.
    pub platform: u32,
    /// The toolchain in use.
    pub toolchain: &'a str,
}

/// The parameters of a run-level policy decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunQuery<'a> {
    /// The architecture the test was built for.
    pub abi: Abi,
    /// The API level of the device the test runs on.
    pub device_api: u32,
    /// The toolchain the test was built with.
    pub toolchain: &'a str,
    /// The case being run.
    pub subtest: &'a str,
}

/// A configuration a test is known to be broken for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnownBroken {
    /// Describes the broken configuration.
    pub label: String,
    /// The bug tracking the breakage.
    pub bug: String,
}

impl KnownBroken {
    /// Creates a new `KnownBroken`.
    pub fn new(label: impl Into<String>, bug: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bug: bug.into(),
        }
    }
}

/// The decisions a per-test policy can make.
///
/// Every method has a default implementation with the permissive answer, so implementors only
/// override what they need.
pub trait TestPolicy: fmt::Debug + Send + Sync {
    /// Returns the broken configuration and bug if the test is known to fail to build (or, for
    /// tests without a run phase, to fail at all) for `query`.
    ///
    /// Broken tests are still built and run; only their final pass/fail is reinterpreted.
    fn build_broken(&self, query: &BuildQuery<'_>) -> Option<KnownBroken> {
        let _ = query;
        None
    }

    /// Returns a label if building for `query` makes no sense. Unsupported tests are never
    /// built.
    fn build_unsupported(&self, query: &BuildQuery<'_>) -> Option<String> {
        let _ = query;
        None
    }

    /// Returns the broken configuration and bug if a case is known to fail on a device.
    fn run_broken(&self, query: &RunQuery<'_>) -> Option<KnownBroken> {
        let _ = query;
        None
    }

    /// Returns a label if running a case on a device makes no sense.
    fn run_unsupported(&self, query: &RunQuery<'_>) -> Option<String> {
        let _ = query;
        None
    }

    /// Extra flags to pass to the CMake configure step.
    fn extra_build_flags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The policy used when a test has no policy file.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPolicy;

impl TestPolicy for NullPolicy {}

/// A policy loaded from a `test_config.toml` file.
///
/// Rules within a section are evaluated in order; the first matching rule wins.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    build_broken: Vec<BuildRule>,
    #[serde(default)]
    build_unsupported: Vec<BuildRule>,
    #[serde(default)]
    run_broken: Vec<RunRule>,
    #[serde(default)]
    run_unsupported: Vec<RunRule>,
    #[serde(default)]
    extra_build_flags: Vec<String>,
}

impl PolicyFile {
    /// Parses a policy from TOML.
    pub fn parse(contents: &str) -> Result<Self, PolicyParseError> {
        let policy: PolicyFile = toml::from_str(contents)?;
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<(), PolicyParseError> {
        let sections = [
            ("build-broken", bug_entries(&self.build_broken, |rule| &rule.bug), true),
            ("build-unsupported", bug_entries(&self.build_unsupported, |rule| &rule.bug), false),
            ("run-broken", bug_entries(&self.run_broken, |rule| &rule.bug), true),
            ("run-unsupported", bug_entries(&self.run_unsupported, |rule| &rule.bug), false),
        ];

        // Broken rules must name a bug; unsupported rules must not.
        for (section, has_bug, broken) in sections {
            let Some(index) = has_bug.iter().position(|&has_bug| has_bug != broken) else {
                continue;
            };
            let index = index + 1;
            return Err(if broken {
                PolicyParseError::MissingBug { section, index }
            } else {
                PolicyParseError::UnexpectedBug { section, index }
            });
        }
        Ok(())
    }
}

fn bug_entries<R>(rules: &[R], bug: impl Fn(&R) -> &Option<String>) -> Vec<bool> {
    rules.iter().map(|rule| bug(rule).is_some()).collect()
}

impl TestPolicy for PolicyFile {
    fn build_broken(&self, query: &BuildQuery<'_>) -> Option<KnownBroken> {
        let rule = self.build_broken.iter().find(|rule| rule.matches(query))?;
        Some(KnownBroken::new(
            rule.label(query),
            rule.bug.clone().unwrap_or_default(),
        ))
    }

    fn build_unsupported(&self, query: &BuildQuery<'_>) -> Option<String> {
        self.build_unsupported
            .iter()
            .find(|rule| rule.matches(query))
            .map(|rule| rule.label(query))
    }

    fn run_broken(&self, query: &RunQuery<'_>) -> Option<KnownBroken> {
        let rule = self.run_broken.iter().find(|rule| rule.matches(query))?;
        Some(KnownBroken::new(
            rule.label(query),
            rule.bug.clone().unwrap_or_default(),
        ))
    }

    fn run_unsupported(&self, query: &RunQuery<'_>) -> Option<String> {
        self.run_unsupported
            .iter()
            .find(|rule| rule.matches(query))
            .map(|rule| rule.label(query))
    }

    fn extra_build_flags(&self) -> Vec<String> {
        self.extra_build_flags.clone()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BuildRule {
    #[serde(default)]
    abi: Vec<Abi>,
    #[serde(default)]
    platform: Vec<u32>,
    platform_below: Option<u32>,
    #[serde(default)]
    toolchain: Vec<String>,
    label: Option<String>,
    bug: Option<String>,
}

impl BuildRule {
    fn matches(&self, query: &BuildQuery<'_>) -> bool {
        matches_any(&self.abi, &query.abi)
            && matches_any(&self.platform, &query.platform)
            && self.platform_below.is_none_or(|below| query.platform < below)
            && (self.toolchain.is_empty() || self.toolchain.iter().any(|t| t == query.toolchain))
    }

    fn label(&self, query: &BuildQuery<'_>) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let mut parts = Vec::new();
        if !self.abi.is_empty() {
            parts.push(query.abi.to_string());
        }
        if !self.platform.is_empty() || self.platform_below.is_some() {
            parts.push(app_platform(query.platform));
        }
        if !self.toolchain.is_empty() {
            parts.push(query.toolchain.to_owned());
        }
        join_label(parts)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RunRule {
    #[serde(default)]
    abi: Vec<Abi>,
    #[serde(default)]
    device_api: Vec<u32>,
    device_api_below: Option<u32>,
    #[serde(default)]
    toolchain: Vec<String>,
    #[serde(default)]
    subtest: Vec<String>,
    label: Option<String>,
    bug: Option<String>,
}

impl RunRule {
    fn matches(&self, query: &RunQuery<'_>) -> bool {
        matches_any(&self.abi, &query.abi)
            && matches_any(&self.device_api, &query.device_api)
            && self.device_api_below.is_none_or(|below| query.device_api < below)
            && (self.toolchain.is_empty() || self.toolchain.iter().any(|t| t == query.toolchain))
            && (self.subtest.is_empty() || self.subtest.iter().any(|s| s == query.subtest))
    }

    fn label(&self, query: &RunQuery<'_>) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let mut parts = Vec::new();
        if !self.abi.is_empty() {
            parts.push(query.abi.to_string());
        }
        if !self.device_api.is_empty() || self.device_api_below.is_some() {
            parts.push(format!("device API {}", query.device_api));
        }
        if !self.toolchain.is_empty() {
            parts.push(query.toolchain.to_owned());
        }
        if !self.subtest.is_empty() {
            parts.push(query.subtest.to_owned());
        }
        join_label(parts)
    }
}

fn matches_any<T: PartialEq>(allowed: &[T], value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn join_label(parts: Vec<String>) -> String {
    if parts.is_empty() {
        "all".to_owned()
    } else {
        parts.join(" ")
    }
}

/// Loads the policy for the test in `test_dir`.
///
/// A missing policy file is not an error: the test gets a [`NullPolicy`].
pub fn load_policy(test_dir: &Utf8Path) -> Result<Arc<dyn TestPolicy>, ConfigurationError> {
    let path = test_dir.join(POLICY_FILE_NAME);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(Arc::new(NullPolicy));
        }
        Err(error) => return Err(ConfigurationError::PolicyRead { path, error }),
    };

    debug!("loading policy from {path}");
    match PolicyFile::parse(&contents) {
        Ok(policy) => Ok(Arc::new(policy)),
        Err(error) => Err(ConfigurationError::PolicyParse { path, error }),
    }
}
