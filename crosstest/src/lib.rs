// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A runner for a cross-compiling toolchain's test corpus.
//!
//! The engine lives in the `crosstest-runner` crate. This crate is the command-line front end:
//! it parses arguments, sets up logging and maps results to exit codes.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
