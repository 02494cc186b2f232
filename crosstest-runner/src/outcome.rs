// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test outcomes and their classification against a policy.

use crate::policy::KnownBroken;
use std::fmt;

/// The result of one test or subtest execution attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// The name of the test, or `test.case` for a subtest.
    pub name: String,

    /// What happened.
    pub status: OutcomeStatus,
}

/// The classification of an [`Outcome`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutcomeStatus {
    /// The test passed.
    Success,

    /// The test failed.
    Failure {
        /// Output or explanation of the failure.
        message: String,
    },

    /// The test was not attempted.
    Skipped {
        /// Why the test was skipped.
        reason: String,
    },

    /// The test failed in a configuration it is known to be broken for.
    ExpectedFailure {
        /// The broken configuration.
        label: String,
        /// The bug tracking the breakage.
        bug: String,
    },

    /// The test passed in a configuration it is known to be broken for.
    UnexpectedSuccess {
        /// The broken configuration.
        label: String,
        /// The bug tracking the breakage.
        bug: String,
    },
}

impl OutcomeStatus {
    /// Returns the label shown by reporters for this status.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "PASS",
            Self::Failure { .. } => "FAIL",
            Self::Skipped { .. } => "SKIP",
            Self::ExpectedFailure { .. } => "KNOWN FAIL",
            Self::UnexpectedSuccess { .. } => "SHOULD FAIL",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl Outcome {
    /// Creates a successful outcome.
    pub fn success(name: impl Into<String>) -> Self {
        Self::new(name, OutcomeStatus::Success)
    }

    /// Creates a failed outcome.
    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            name,
            OutcomeStatus::Failure {
                message: message.into(),
            },
        )
    }

    /// Creates a skipped outcome.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            name,
            OutcomeStatus::Skipped {
                reason: reason.into(),
            },
        )
    }

    /// Creates the outcome of a test a policy declared unsupported for `label`.
    pub fn unsupported(name: impl Into<String>, label: &str) -> Self {
        Self::skipped(name, format!("test unsupported for {label}"))
    }

    fn new(name: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    /// Returns true if this outcome counts as a pass.
    pub fn passed(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Success | OutcomeStatus::ExpectedFailure { .. }
        )
    }

    /// Returns true if this outcome counts as a failure.
    pub fn failed(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Failure { .. } | OutcomeStatus::UnexpectedSuccess { .. }
        )
    }

    /// Reclassifies a raw pass or fail against a known-broken configuration.
    ///
    /// Only `Success` and `Failure` are affected, and only when `broken` is `Some`. Every
    /// other status is returned unchanged.
    pub fn fixup(self, broken: Option<&KnownBroken>) -> Outcome {
        let Some(broken) = broken else {
            return self;
        };
        let status = match self.status {
            OutcomeStatus::Success => OutcomeStatus::UnexpectedSuccess {
                label: broken.label.clone(),
                bug: broken.bug.clone(),
            },
            OutcomeStatus::Failure { .. } => OutcomeStatus::ExpectedFailure {
                label: broken.label.clone(),
                bug: broken.bug.clone(),
            },
            other => other,
        };
        Outcome {
            name: self.name,
            status,
        }
    }
}

/// The outcomes produced by running one test.
///
/// This is consumed once, by the worker that ran the test.
#[derive(Debug)]
#[must_use = "outcomes must be collected"]
pub struct Outcomes {
    inner: std::vec::IntoIter<Outcome>,
}

impl Outcomes {
    /// A sequence of exactly one outcome.
    pub fn single(outcome: Outcome) -> Self {
        vec![outcome].into()
    }
}

impl From<Vec<Outcome>> for Outcomes {
    fn from(outcomes: Vec<Outcome>) -> Self {
        Self {
            inner: outcomes.into_iter(),
        }
    }
}

impl FromIterator<Outcome> for Outcomes {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl Iterator for Outcomes {
    type Item = Outcome;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Outcomes {}
