// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable vocabulary for wptrunner.
//!
//! This crate contains the data formats shared between the test runner and tools built around
//! it: the public status vocabulary, test types, the JSON test manifest consumed by
//! `wptrunner run`, and the documented exit codes.

mod exit_codes;
mod manifest;
mod status;

pub use exit_codes::*;
pub use manifest::*;
pub use status::*;
