//! Named status checks.
//!
//! A check never gates control flow: it only records whether the response
//! matched. A status that matches neither check, or a request that got no
//! response at all, fails every check.

use reqwest::StatusCode;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const STATUS_WAS_201: Check = Check::new("status was 201", StatusCode::CREATED);
pub const STATUS_WAS_429: Check = Check::new("status was 429", StatusCode::TOO_MANY_REQUESTS);

pub const TICKET_CHECKS: [Check; 2] = [STATUS_WAS_201, STATUS_WAS_429];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Check {
    name: &'static str,
    expected: StatusCode,
}

impl Check {
    pub const fn new(name: &'static str, expected: StatusCode) -> Self {
        Self { name, expected }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn expected(&self) -> StatusCode {
        self.expected
    }

    pub fn evaluate(&self, status: Option<StatusCode>) -> CheckOutcome {
        CheckOutcome {
            name: self.name,
            passed: status == Some(self.expected),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
}

struct CheckCounter {
    name: &'static str,
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Pass/fail counts per check, shared by every virtual user of a run.
pub struct CheckTally {
    counters: Vec<CheckCounter>,
}

impl CheckTally {
    pub fn new(checks: &[Check]) -> Self {
        Self {
            counters: checks
                .iter()
                .map(|check| CheckCounter {
                    name: check.name(),
                    passes: AtomicU64::new(0),
                    fails: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    pub fn record(&self, outcomes: &[CheckOutcome]) {
        for outcome in outcomes {
            if let Some(counter) = self.counters.iter().find(|c| c.name == outcome.name) {
                let slot = if outcome.passed {
                    &counter.passes
                } else {
                    &counter.fails
                };
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn summary(&self) -> Vec<CheckSummary> {
        self.counters
            .iter()
            .map(|counter| CheckSummary {
                name: counter.name,
                passes: counter.passes.load(Ordering::Relaxed),
                fails: counter.fails.load(Ordering::Relaxed),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CheckSummary {
    pub name: &'static str,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    pub fn pass_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passes as f64 / total as f64,
        }
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.fails == 0 { '✓' } else { '✗' };
        write!(
            f,
            "{} {:.<32} {:>6.2}% ✓ {} ✗ {}",
            mark,
            format!("{} ", self.name),
            self.pass_rate() * 100.0,
            self.passes,
            self.fails,
        )
    }
}
