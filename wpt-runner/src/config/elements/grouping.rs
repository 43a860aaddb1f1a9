// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::TestGroupingParseError,
    list::{PathGroupedSource, SingleTestSource, TestSource},
};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Type for the `test-grouping` config key: how tests are split into groups.
///
/// In the config file this is either the string `"single"`, or a table `{ by-dir = <depth> }`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TestGrouping {
    /// Spread tests over one group per runner, by a stable hash of the test ID.
    #[default]
    Single,

    /// Consecutive tests sharing their first `depth` directory components form a group.
    ///
    /// A depth of 0 groups by the full directory.
    ByDir {
        /// The number of leading directory components to group by.
        depth: usize,
    },
}

impl TestGrouping {
    /// Returns the test source corresponding to this grouping.
    pub fn make_source(self, processes: usize) -> Box<dyn TestSource> {
        match self {
            Self::Single => Box::new(SingleTestSource::new(processes)),
            Self::ByDir { depth } => Box::new(PathGroupedSource::new(depth)),
        }
    }
}

impl FromStr for TestGrouping {
    type Err = TestGroupingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "single" {
            return Ok(Self::Single);
        }
        if s == "by-dir" {
            return Ok(Self::ByDir { depth: 0 });
        }

        s.strip_prefix("by-dir=")
            .and_then(|depth| depth.parse().ok())
            .map(|depth| Self::ByDir { depth })
            .ok_or_else(|| TestGroupingParseError::new(s))
    }
}

impl fmt::Display for TestGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::ByDir { depth } => write!(f, "by-dir={depth}"),
        }
    }
}

impl<'de> Deserialize<'de> for TestGrouping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de2> serde::de::Visitor<'de2> for V {
            type Value = TestGrouping;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "the string \"single\" or a table {{ by-dir = <depth> }}"
                )
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "single" {
                    Ok(TestGrouping::Single)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de2>,
            {
                let mut depth = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "by-dir" => {
                            if depth.is_some() {
                                return Err(serde::de::Error::duplicate_field("by-dir"));
                            }
                            depth = Some(map.next_value::<usize>()?);
                        }
                        other => {
                            return Err(serde::de::Error::unknown_field(other, &["by-dir"]));
                        }
                    }
                }

                depth
                    .map(|depth| TestGrouping::ByDir { depth })
                    .ok_or_else(|| serde::de::Error::missing_field("by-dir"))
            }
        }

        deserializer.deserialize_any(V)
    }
}
