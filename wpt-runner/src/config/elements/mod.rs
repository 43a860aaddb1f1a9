// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod grouping;
mod processes;

pub use grouping::*;
pub use processes::*;
