// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out test results.
//!
//! The main structure in this module is [`TestReporter`], which writes human-readable output to
//! standard error and, optionally, a mozlog-style structured log.

mod displayer;
pub mod events;
mod imp;
mod structured;

pub use imp::*;
pub use structured::StructuredReporter;
