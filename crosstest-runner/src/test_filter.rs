// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Name-based test selection.
//!
//! A filter is a list of patterns of the form `test[.subtest]`. Both halves are globs. The same
//! predicate is used to decide whether a test is scheduled at all (with just the test name) and
//! whether an individual case is run (with `test.case`).

use crate::errors::TestFilterParseError;
use regex::bytes::Regex;

/// Selects tests and subtests by name.
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    patterns: Vec<FilterPattern>,
}

impl TestFilter {
    /// Creates a new filter from a list of patterns. An empty list matches everything.
    pub fn new<I, S>(patterns: I) -> Result<Self, TestFilterParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| FilterPattern::new(pattern.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// A filter that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns true if `name` (either `test` or `test.case`) is selected.
    pub fn matches(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let (test, subtest) = split_name(name);
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(test, subtest))
    }
}

#[derive(Clone, Debug)]
struct FilterPattern {
    test: Regex,
    subtest: Option<Regex>,
}

impl FilterPattern {
    fn new(pattern: &str) -> Result<Self, TestFilterParseError> {
        let (test, subtest) = split_name(pattern);
        if test.is_empty() {
            return Err(TestFilterParseError::new(pattern, "test name is empty"));
        }
        Ok(Self {
            test: glob_regex(pattern, test)?,
            subtest: subtest.map(|glob| glob_regex(pattern, glob)).transpose()?,
        })
    }

    fn matches(&self, test: &str, subtest: Option<&str>) -> bool {
        if !self.test.is_match(test.as_bytes()) {
            return false;
        }
        match (&self.subtest, subtest) {
            (Some(regex), Some(subtest)) => regex.is_match(subtest.as_bytes()),
            _ => true,
        }
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((test, subtest)) => (test, Some(subtest)),
        None => (name, None),
    }
}

fn glob_regex(pattern: &str, glob: &str) -> Result<Regex, TestFilterParseError> {
    let glob = globset::GlobBuilder::new(glob)
        // Only allow escapes via [].
        .backslash_escape(false)
        .empty_alternates(true)
        .build()
        .map_err(|error| TestFilterParseError::new(pattern, error.kind().to_string()))?;

    Regex::new(glob.regex()).map_err(|error| TestFilterParseError::new(pattern, error.to_string()))
}
