// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `wptrunner` command-line tool.
//!
//! `wptrunner run` reads a JSON test manifest, runs every selected test through the chosen
//! browser product, and reports results on standard error and optionally as a mozlog-style
//! structured log. `wptrunner list` shows which tests a run would consider.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
