// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ConfigWarnings, WptConfig};
use crate::errors::ConfigParseError;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use std::collections::BTreeSet;

/// Writes `contents` to `wptrunner.toml` in a temporary directory and reads it back.
pub(super) fn config_from_str(contents: &str) -> Result<WptConfig, ConfigParseError> {
    let (_dir, result) = config_from_str_with_warnings(contents, &mut CollectedWarnings::default());
    result
}

pub(super) fn config_from_str_with_warnings(
    contents: &str,
    warnings: &mut CollectedWarnings,
) -> (Utf8TempDir, Result<WptConfig, ConfigParseError>) {
    let dir = camino_tempfile::tempdir().expect("created temp dir");
    std::fs::write(dir.path().join(WptConfig::CONFIG_PATH), contents)
        .expect("wrote config file");
    let result = WptConfig::from_sources_with_warnings(dir.path(), None, warnings);
    (dir, result)
}

#[derive(Debug, Default)]
pub(super) struct CollectedWarnings {
    pub(super) unknown_keys: BTreeSet<String>,
}

impl ConfigWarnings for CollectedWarnings {
    fn unknown_config_keys(&mut self, _config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        self.unknown_keys.extend(unknown.iter().cloned());
    }
}
