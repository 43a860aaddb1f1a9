// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{config::get_num_cpus, errors::ProcessesParseError};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Type for the `processes` config key: the number of (browser, worker) pairs run in parallel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Processes {
    /// Run this many runners.
    Count(usize),

    /// Run one runner per logical CPU.
    NumCpus,
}

impl Processes {
    /// Gets the actual number of runners computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(count) => count,
            Self::NumCpus => get_num_cpus(),
        }
    }

    // Negative values count down from the number of CPUs, keeping at least one runner.
    fn from_signed(value: i64) -> Option<Self> {
        match value.cmp(&0) {
            Ordering::Greater => Some(Self::Count(value as usize)),
            Ordering::Less => Some(Self::Count((get_num_cpus() as i64 + value).max(1) as usize)),
            Ordering::Equal => None,
        }
    }
}

impl FromStr for Processes {
    type Err = ProcessesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        let value = s
            .parse::<i64>()
            .map_err(|_| ProcessesParseError::new(s, "expected an integer or \"num-cpus\""))?;
        Self::from_signed(value)
            .ok_or_else(|| ProcessesParseError::new(s, "processes may not be 0"))
    }
}

impl fmt::Display for Processes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for Processes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Processes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(Processes::NumCpus)
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
                Processes::from_signed(v).ok_or_else(|| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match i64::try_from(v) {
                    Ok(v) => self.visit_i64(v),
                    Err(_) => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WptConfig, test_helpers::config_from_str};
    use indoc::indoc;
    use test_case::test_case;

    #[test_case(
        indoc! {r#"
            [profile.custom]
            processes = -1
        "#},
        Some((get_num_cpus() - 1).max(1))

        ; "negative"
    )]
    #[test_case(
        indoc! {r#"
            [profile.custom]
            processes = 3
        "#},
        Some(3)

        ; "positive"
    )]
    #[test_case(
        indoc! {r#"
            [profile.custom]
            processes = 0
        "#},
        None

        ; "zero"
    )]
    #[test_case(
        indoc! {r#"
            [profile.custom]
            processes = "num-cpus"
        "#},
        Some(get_num_cpus())

        ; "num-cpus"
    )]
    fn parse_processes(config_contents: &str, expected: Option<usize>) {
        let config = config_from_str(config_contents);
        match expected {
            None => assert!(config.is_err(), "zero processes is rejected"),
            Some(n) => assert_eq!(
                config
                    .expect("config is valid")
                    .profile("custom")
                    .expect("custom profile exists")
                    .processes()
                    .compute(),
                n,
            ),
        }
    }

    #[test_case("4", Some(Processes::Count(4)); "count")]
    #[test_case("num-cpus", Some(Processes::NumCpus); "num cpus")]
    #[test_case("0", None; "zero")]
    #[test_case("many", None; "garbage")]
    fn from_str(input: &str, expected: Option<Processes>) {
        assert_eq!(input.parse::<Processes>().ok(), expected);
    }

    #[test]
    fn default_is_one() {
        let config = WptConfig::default_config();
        let profile = config
            .profile(WptConfig::DEFAULT_PROFILE)
            .expect("default profile exists");
        assert_eq!(profile.processes(), Processes::Count(1));
    }
}
