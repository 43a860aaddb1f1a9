// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for wptrunner.
//!
//! Configuration is read from an embedded default config, with `wptrunner.toml` (or a file passed
//! in explicitly) layered on top. Settings are grouped into profiles: `[profile.default]` always
//! exists, and every other profile falls back to it for keys it doesn't set.

mod core;
mod elements;

pub use core::*;
pub use elements::*;

#[cfg(test)]
mod test_helpers;
