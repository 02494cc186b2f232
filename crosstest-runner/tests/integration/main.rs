// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod basic;
#[cfg(unix)]
mod device;
mod fixtures;
