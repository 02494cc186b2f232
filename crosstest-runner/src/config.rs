// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner configuration.
//!
//! Configuration is layered: the embedded [default config](RunnerConfig::DEFAULT_CONFIG) is
//! read first, then `.config/crosstest.toml` under the tests root (or an explicitly passed
//! file) is layered on top.

use crate::{
    device::AdbDevice,
    errors::{ConfigParseError, ConfigParseErrorKind, ConfigurationError, TestThreadsParseError},
    test::{BuildTools, ScriptFixtureTools},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::{cmp::Ordering, collections::BTreeSet, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for crosstest.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    test_threads: TestThreads,
    tools: ToolsConfig,
    device: DeviceConfig,
}

impl RunnerConfig {
    /// The default location of the config within the tests root.
    pub const CONFIG_PATH: &'static str = ".config/crosstest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the tests root and an optional explicit config file.
    ///
    /// If `config_file` is given it must exist. Otherwise `.config/crosstest.toml` under
    /// `tests_root` is read if present.
    pub fn from_sources(
        tests_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = tests_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Config::builder()
            .add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(source);
        let (config, ignored) = Self::build_and_deserialize_config(builder)
            .map_err(|kind| ConfigParseError::new(config_file.clone(), kind))?;

        if !ignored.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {config_file}: {}",
                ignored.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
            );
        }

        Ok(config.into_config())
    }

    /// Returns the default config.
    #[cfg(test)]
    pub(crate) fn default_config() -> Self {
        let (config, ignored) = Self::build_and_deserialize_config(
            Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml)),
        )
        .expect("default config is always valid");

        // The default config is shipped with the binary, so it must not have unknown keys.
        assert!(
            ignored.is_empty(),
            "found unknown keys in default config: {}",
            ignored.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
        );
        config.into_config()
    }

    /// Returns the number of tests to run at the same time.
    pub fn test_threads(&self) -> TestThreads {
        self.test_threads
    }

    /// Returns the tool configuration.
    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    /// Returns the device configuration.
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn build_and_deserialize_config(
        builder: config::builder::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<(RunnerConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RunnerConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    test_threads: TestThreads,
    tools: ToolsConfig,
    device: DeviceConfig,
}

impl RunnerConfigDeserialize {
    fn into_config(self) -> RunnerConfig {
        RunnerConfig {
            test_threads: self.test_threads,
            tools: self.tools,
            device: self.device,
        }
    }
}

/// The `[tools]` section: paths to the external tools tests are built and run with.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolsConfig {
    /// The root of the NDK under test.
    pub ndk_root: Option<Utf8PathBuf>,

    /// The directory containing the scripts for the awk suite.
    pub awk_scripts_dir: Option<Utf8PathBuf>,

    /// The `cmake` executable.
    pub cmake: String,

    /// The `ninja` executable.
    pub ninja: String,

    /// The `bash` executable.
    pub bash: String,

    /// The `awk` executable.
    pub awk: String,
}

impl ToolsConfig {
    /// Returns the tools needed by build and device tests.
    pub fn build_tools(&self) -> Result<BuildTools, ConfigurationError> {
        let ndk_root = self
            .ndk_root
            .clone()
            .ok_or(ConfigurationError::ToolNotConfigured {
                tool: "ndk-build",
                key: "tools.ndk-root",
            })?;
        Ok(BuildTools {
            ndk_root,
            cmake: self.cmake.clone(),
            ninja: self.ninja.clone(),
            bash: self.bash.clone(),
        })
    }

    /// Returns the tools needed by script-fixture tests.
    pub fn script_fixture_tools(&self) -> Result<ScriptFixtureTools, ConfigurationError> {
        let scripts_dir = match (&self.awk_scripts_dir, &self.ndk_root) {
            (Some(dir), _) => dir.clone(),
            (None, Some(ndk_root)) => ndk_root.join("build").join("awk"),
            (None, None) => {
                return Err(ConfigurationError::ToolNotConfigured {
                    tool: "awk scripts",
                    key: "tools.awk-scripts-dir",
                });
            }
        };
        Ok(ScriptFixtureTools {
            interpreter: self.awk.clone(),
            scripts_dir,
        })
    }
}

/// The `[device]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    /// The `adb` executable.
    pub adb: String,

    /// The serial number of the device to use.
    pub serial: Option<String>,

    /// The directory on the device that test products are pushed under.
    pub work_dir: String,
}

impl DeviceConfig {
    /// Returns a handle to the configured device.
    pub fn adb_device(&self) -> AdbDevice {
        AdbDevice::new(&self.adb, self.serial.clone())
    }
}

/// Type for the test-threads config key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run tests with a specified number of threads.
    Count(usize),

    /// Run tests with a number of threads equal to the logical CPU count.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual number of test threads computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<isize>() {
            Err(e) => Err(TestThreadsParseError::new(format!(
                "Error: {e} parsing {s}"
            ))),
            Ok(0) => Err(TestThreadsParseError::new("jobs may not be 0")),
            Ok(j) if j < 0 => Ok(TestThreads::Count(
                (get_num_cpus() as isize + j).max(1) as usize,
            )),
            Ok(j) => Ok(TestThreads::Count(j as usize)),
        }
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(TestThreads::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // TOML integers are i64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(TestThreads::Count(v as usize)),
                    Ordering::Less => Ok(TestThreads::Count(
                        (get_num_cpus() as i64 + v).max(1) as usize,
                    )),
                    Ordering::Equal => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                    v => Ok(TestThreads::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
