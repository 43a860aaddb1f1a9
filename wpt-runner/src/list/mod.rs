// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for building and querying lists of tests.
//!
//! A [`TestList`] is read from a manifest. The tests it selects are then turned into a
//! [`TestQueue`] of groups by a [`TestSource`].

mod group;
mod source;
mod test;
mod test_list;

pub use group::*;
pub use source::*;
pub use test::*;
pub use test_list::*;
