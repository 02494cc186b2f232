// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for crosstest, a runner for a cross-compiling toolchain's test corpus.
//!
//! The basic flow: a [`TestRunner`](runner::TestRunner) discovers suites of
//! [`Test`](test::Test)s from directory trees, then runs each test on a pool of workers. A test
//! is built with the strategy its directory calls for, optionally run on a
//! [`Device`](device::Device), and its raw outcomes are reclassified against the test's
//! [policy](policy) before being streamed to a [`TestReporter`](reporter::TestReporter).

pub mod config;
pub mod device;
pub mod errors;
mod helpers;
pub mod outcome;
pub mod policy;
pub mod reporter;
pub mod runner;
pub mod target;
pub mod test_filter;

pub use helpers::plural;
