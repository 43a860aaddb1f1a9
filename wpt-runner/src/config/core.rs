// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Processes, TestGrouping};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
    time::Duration,
};
use tracing::warn;

/// Trait for handling configuration warnings.
///
/// The default implementation, [`DefaultConfigWarnings`], logs warnings through `tracing`.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Default implementation of [`ConfigWarnings`] that logs warnings using the tracing crate.
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.extend(unknown.iter().map(String::as_str));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

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

/// Overall configuration for wptrunner.
///
/// This is the root data structure for wptrunner configuration. Most runs will want to look up a
/// profile with [`Self::profile`].
#[derive(Clone, Debug)]
pub struct WptConfig {
    default_profile: DefaultProfileImpl,
    other_profiles: BTreeMap<String, CustomProfileImpl>,
}

impl WptConfig {
    /// The default location of the config within a directory.
    pub const CONFIG_PATH: &'static str = "wptrunner.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `wptrunner.toml` in `dir`.
    ///
    /// If no config file is specified and `dir` doesn't have `wptrunner.toml`, uses the default
    /// config options.
    pub fn from_sources(
        dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(dir, config_file, &mut DefaultConfigWarnings)
    }

    /// Loads configuration from the given sources with custom warning handling.
    pub fn from_sources_with_warnings(
        dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &unknown);
        }

        deserialized.into_config(&config_file)
    }

    /// Returns the default config, without any user configuration layered on top.
    pub fn default_config() -> Self {
        let config_file = Utf8Path::new("<default config>");
        let result = Self::build_and_deserialize_config(&Self::make_default_config())
            .map_err(|kind| ConfigParseError::new(config_file, kind))
            .and_then(|(deserialized, _)| deserialized.into_config(config_file));

        // The default config is embedded in the binary and checked by tests.
        match result {
            Ok(config) => config,
            Err(error) => panic!("embedded default config is invalid: {error}"),
        }
    }

    /// Returns the profile with the given name, or an error if the profile isn't defined.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<WptProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match name {
            Self::DEFAULT_PROFILE => None,
            other => Some(
                self.other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(name, self.all_profiles()))?,
            ),
        };

        Ok(WptProfile {
            name: name.to_owned(),
            default_profile: &self.default_profile,
            custom_profile,
        })
    }

    /// Returns the names of all known profiles.
    pub fn all_profiles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(Self::DEFAULT_PROFILE)
            .chain(self.other_profiles.keys().map(|key| key.as_str()))
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(WptConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: WptConfigDeserialize =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // serde_path_to_error already reports the key, so strip it from the config error.
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

/// A named set of runner settings, falling back to the default profile for unset keys.
///
/// Returned by [`WptConfig::profile`].
#[derive(Clone, Debug)]
pub struct WptProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

macro_rules! profile_field {
    ($profile:ident.$field:ident) => {
        $profile
            .custom_profile
            .and_then(|p| p.$field)
            .unwrap_or($profile.default_profile.$field)
    };
}

impl WptProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of runners to start.
    pub fn processes(&self) -> Processes {
        profile_field!(self.processes)
    }

    /// Returns the number of consecutive initialization failures tolerated by a runner.
    pub fn max_restarts(&self) -> usize {
        profile_field!(self.max_restarts)
    }

    /// Returns true if the browser should be restarted after unexpected results.
    pub fn restart_on_unexpected(&self) -> bool {
        profile_field!(self.restart_on_unexpected)
    }

    /// Returns the number of times each test is run.
    pub fn rerun(&self) -> usize {
        profile_field!(self.rerun)
    }

    /// Returns the multiplier applied to test and initialization timeouts.
    pub fn timeout_multiplier(&self) -> f64 {
        profile_field!(self.timeout_multiplier)
    }

    /// Returns true if runners should wait for the browser to be closed after each test.
    pub fn pause_after_test(&self) -> bool {
        profile_field!(self.pause_after_test)
    }

    /// Returns true if runners should wait for the browser to be closed after unexpected results.
    pub fn pause_on_unexpected(&self) -> bool {
        profile_field!(self.pause_on_unexpected)
    }

    /// Returns the unscaled time allowed for the browser and worker to start.
    pub fn init_timeout(&self) -> Duration {
        profile_field!(self.init_timeout)
    }

    /// Returns the grace period added to a test's scaled timeout before it is killed.
    pub fn external_timeout_grace(&self) -> Duration {
        profile_field!(self.external_timeout_grace)
    }

    /// Returns how long a worker is given to exit when it is stopped.
    pub fn stop_grace_period(&self) -> Duration {
        profile_field!(self.stop_grace_period)
    }

    /// Returns how often runners check that their worker is alive.
    pub fn poll_interval(&self) -> Duration {
        profile_field!(self.poll_interval)
    }

    /// Returns how tests are split into groups.
    pub fn test_grouping(&self) -> TestGrouping {
        profile_field!(self.test_grouping)
    }
}

// This is the form of `WptConfig` that gets deserialized.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WptConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: BTreeMap<String, CustomProfileImpl>,
}

impl WptConfigDeserialize {
    fn into_config(mut self, config_file: &Utf8Path) -> Result<WptConfig, ConfigParseError> {
        let default_profile = self
            .profiles
            .remove(WptConfig::DEFAULT_PROFILE)
            .and_then(DefaultProfileImpl::new)
            .ok_or_else(|| {
                ConfigParseError::new(
                    config_file,
                    ConfigParseErrorKind::BuildError(Box::new(ConfigError::Message(
                        "[profile.default] is missing required keys".to_owned(),
                    ))),
                )
            })?;

        Ok(WptConfig {
            default_profile,
            other_profiles: self.profiles,
        })
    }
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    processes: Processes,
    max_restarts: usize,
    restart_on_unexpected: bool,
    rerun: usize,
    timeout_multiplier: f64,
    pause_after_test: bool,
    pause_on_unexpected: bool,
    init_timeout: Duration,
    external_timeout_grace: Duration,
    stop_grace_period: Duration,
    poll_interval: Duration,
    test_grouping: TestGrouping,
}

impl DefaultProfileImpl {
    // Every key is present in the embedded default config, so this only fails if that file is
    // broken.
    fn new(p: CustomProfileImpl) -> Option<Self> {
        Some(Self {
            processes: p.processes?,
            max_restarts: p.max_restarts?,
            restart_on_unexpected: p.restart_on_unexpected?,
            rerun: p.rerun?,
            timeout_multiplier: p.timeout_multiplier?,
            pause_after_test: p.pause_after_test?,
            pause_on_unexpected: p.pause_on_unexpected?,
            init_timeout: p.init_timeout?,
            external_timeout_grace: p.external_timeout_grace?,
            stop_grace_period: p.stop_grace_period?,
            poll_interval: p.poll_interval?,
            test_grouping: p.test_grouping?,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    processes: Option<Processes>,
    #[serde(default)]
    max_restarts: Option<usize>,
    #[serde(default)]
    restart_on_unexpected: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_rerun")]
    rerun: Option<usize>,
    #[serde(default)]
    timeout_multiplier: Option<f64>,
    #[serde(default)]
    pause_after_test: Option<bool>,
    #[serde(default)]
    pause_on_unexpected: Option<bool>,
    #[serde(default, with = "humantime_serde::option")]
    init_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    external_timeout_grace: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    stop_grace_period: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_poll_interval")]
    poll_interval: Option<Duration>,
    #[serde(default)]
    test_grouping: Option<TestGrouping>,
}

fn deserialize_rerun<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<usize>::deserialize(deserializer)? {
        Some(0) => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Unsigned(0),
            &"a positive integer",
        )),
        other => Ok(other),
    }
}

fn deserialize_poll_interval<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match humantime_serde::option::deserialize::<Duration, D>(deserializer)? {
        Some(interval) if interval.is_zero() => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Str("0s"),
            &"a non-zero duration",
        )),
        other => Ok(other),
    }
}
