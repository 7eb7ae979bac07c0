// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Scheduling disciplines and the fixed engine configuration.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::types::{Ticks, TimeSlice};

/// The scheduling discipline. Fixed for the lifetime of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// First-come first-served: FIFO ready queue, no forced preemption.
    Fcfs,
    /// FIFO ready queue, every dispatch bounded by `quantum` ticks.
    RoundRobin { quantum: Ticks },
    /// Ready queue ordered by ascending priority value (FIFO among equals),
    /// with preemption of lower-priority running processes on wake-up.
    Priority,
}

impl Policy {
    /// The time slice handed to the harness with every dispatch.
    pub fn time_slice(self) -> TimeSlice {
        match self {
            Policy::Fcfs | Policy::Priority => TimeSlice::Unbounded,
            Policy::RoundRobin { quantum } => TimeSlice::Ticks(quantum),
        }
    }

    /// Whether the ready queue is kept sorted by priority.
    pub fn is_priority(self) -> bool {
        matches!(self, Policy::Priority)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Fcfs => write!(f, "FCFS"),
            Policy::RoundRobin { quantum } => write!(f, "Round-Robin (quantum={quantum})"),
            Policy::Priority => write!(f, "Preemptive Priority"),
        }
    }
}

/// Parses `fcfs`, `priority`/`pr`, and `rr`/`round-robin` with an optional
/// `:<quantum>` suffix (default quantum 2 ticks).
impl FromStr for Policy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let policy = match (name.to_ascii_lowercase().as_str(), arg) {
            ("fcfs", None) => Policy::Fcfs,
            ("priority" | "pr", None) => Policy::Priority,
            ("rr" | "round-robin", None) => Policy::RoundRobin { quantum: 2 },
            ("rr" | "round-robin", Some(q)) => Policy::RoundRobin {
                quantum: q.parse()?,
            },
            _ => bail!("unknown scheduling policy {s:?}"),
        };
        Ok(policy)
    }
}

/// The configuration a scheduler is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    nr_cpus: u32,
    policy: Policy,
}

impl SchedConfig {
    pub fn new(nr_cpus: u32, policy: Policy) -> Result<Self> {
        if nr_cpus == 0 {
            bail!("at least one CPU is required");
        }
        if let Policy::RoundRobin { quantum: 0 } = policy {
            bail!("round-robin quantum must be greater than 0");
        }
        Ok(Self { nr_cpus, policy })
    }

    pub fn nr_cpus(&self) -> u32 {
        self.nr_cpus
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }
}
