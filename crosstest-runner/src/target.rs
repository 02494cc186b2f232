// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Target architectures and the parameters a test is built for.

use crate::{
    errors::{AbiParseError, ConfigurationError},
    policy::BuildQuery,
};
use camino::Utf8Path;
use serde::Deserialize;
use std::{fmt, io, str::FromStr};

/// A target binary interface.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Abi {
    /// `armeabi`
    Armeabi,
    /// `armeabi-v7a`
    ArmeabiV7a,
    /// `arm64-v8a`
    Arm64V8a,
    /// `x86`
    X86,
    /// `x86_64`
    X86_64,
    /// `mips`
    Mips,
    /// `mips64`
    Mips64,
}

impl Abi {
    /// All known ABIs, in canonical order.
    pub const ALL: &'static [Abi] = &[
        Abi::Armeabi,
        Abi::ArmeabiV7a,
        Abi::Arm64V8a,
        Abi::X86,
        Abi::X86_64,
        Abi::Mips,
        Abi::Mips64,
    ];

    /// Returns the canonical name of this ABI.
    pub fn as_str(self) -> &'static str {
        match self {
            Abi::Armeabi => "armeabi",
            Abi::ArmeabiV7a => "armeabi-v7a",
            Abi::Arm64V8a => "arm64-v8a",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
            Abi::Mips => "mips",
            Abi::Mips64 => "mips64",
        }
    }

    /// Returns true if this is a 64-bit ABI.
    pub fn is_64bit(self) -> bool {
        matches!(self, Abi::Arm64V8a | Abi::X86_64 | Abi::Mips64)
    }

    /// The lowest platform level the toolchain supports for this ABI.
    ///
    /// 64-bit ABIs were introduced with platform 21.
    pub fn min_platform_level(self) -> u32 {
        if self.is_64bit() { 21 } else { 9 }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Abi {
    type Err = AbiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Abi::ALL
            .iter()
            .copied()
            .find(|abi| abi.as_str() == s)
            .ok_or_else(|| AbiParseError::new(s))
    }
}

impl<'de> Deserialize<'de> for Abi {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Formats a platform level the way build systems expect it, e.g. `android-21`.
pub fn app_platform(level: u32) -> String {
    format!("android-{level}")
}

/// Target parameters supplied by the caller for a run.
///
/// The platform is optional: if it is not given, it is inferred per test (see
/// [`BuildTarget::resolve`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildTarget {
    /// The architecture to build for.
    pub abi: Abi,

    /// The platform level to build against, if fixed by the caller.
    pub platform: Option<u32>,

    /// The toolchain to build with.
    pub toolchain: String,

    /// Extra flags passed to ndk-build and to build scripts.
    pub ndk_build_flags: Vec<String>,

    /// Extra flags passed to the CMake configure step.
    pub cmake_flags: Vec<String>,
}

impl BuildTarget {
    /// Creates a new build target with no fixed platform and no extra flags.
    pub fn new(abi: Abi, toolchain: impl Into<String>) -> Self {
        Self {
            abi,
            platform: None,
            toolchain: toolchain.into(),
            ndk_build_flags: Vec::new(),
            cmake_flags: Vec::new(),
        }
    }

    /// Fixes the platform level for every test.
    pub fn with_platform(mut self, platform: u32) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Resolves the platform level for the test in `test_dir`.
    ///
    /// In order of preference: the platform given by the caller, `APP_PLATFORM` from the test's
    /// `jni/Application.mk`, and finally the minimum platform level for the ABI.
    pub fn resolve(&self, test_dir: &Utf8Path) -> Result<ResolvedTarget, ConfigurationError> {
        let platform = match self.platform {
            Some(platform) => platform,
            None => match platform_from_application_mk(test_dir)? {
                Some(platform) => platform,
                None => self.abi.min_platform_level(),
            },
        };

        Ok(ResolvedTarget {
            abi: self.abi,
            platform,
            toolchain: self.toolchain.clone(),
            ndk_build_flags: self.ndk_build_flags.clone(),
            cmake_flags: self.cmake_flags.clone(),
        })
    }
}

/// A [`BuildTarget`] with the platform level resolved for one test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedTarget {
    /// The architecture to build for.
    pub abi: Abi,

    /// The platform level to build against.
    pub platform: u32,

    /// The toolchain to build with.
    pub toolchain: String,

    /// Extra flags passed to ndk-build and to build scripts.
    pub ndk_build_flags: Vec<String>,

    /// Extra flags passed to the CMake configure step.
    pub cmake_flags: Vec<String>,
}

impl ResolvedTarget {
    /// Returns the query used for build-level policy decisions.
    pub fn build_query(&self) -> BuildQuery<'_> {
        BuildQuery {
            abi: self.abi,
            platform: self.platform,
            toolchain: &self.toolchain,
        }
    }
}

/// Reads the platform level declared by `APP_PLATFORM` in `jni/Application.mk`.
///
/// Returns `Ok(None)` if the file is missing or doesn't declare a platform. The first
/// `APP_PLATFORM` line must use `:=`; any other form of assignment is an error.
pub fn platform_from_application_mk(test_dir: &Utf8Path) -> Result<Option<u32>, ConfigurationError> {
    let path = test_dir.join("jni").join("Application.mk");
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(ConfigurationError::ReadTestDir { dir: path, error }),
    };

    // The first APP_PLATFORM line is authoritative, and it must be a simple assignment.
    let Some(line) = contents
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with("APP_PLATFORM"))
    else {
        return Ok(None);
    };
    let Some((_, value)) = line.split_once(":=") else {
        return Err(ConfigurationError::InvalidManifestPlatform {
            path,
            value: line.trim_end().to_owned(),
        });
    };
    let value = value.trim();

    value
        .strip_prefix("android-")
        .and_then(|level| level.parse().ok())
        .map(Some)
        .ok_or_else(|| ConfigurationError::InvalidManifestPlatform {
            path,
            value: value.to_owned(),
        })
}
