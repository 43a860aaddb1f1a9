// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod basic;
mod fixtures;
mod restarts;
mod workers;
