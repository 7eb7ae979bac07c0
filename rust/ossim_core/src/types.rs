// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Newtype wrappers and type aliases for domain concepts.
//!
//! Identifiers (PIDs, CPU IDs) are newtypes so a CPU index can never be
//! passed where a process is expected. Plain quantities (priorities,
//! simulated ticks) are aliases.

use std::fmt;

/// Process identifier, stable for the lifetime of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

/// Simulated CPU identifier, an index into the run table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuId(pub u32);

impl CpuId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority. Lower value = higher priority.
pub type Priority = u32;

/// Simulated time, in harness ticks.
pub type Ticks = u64;

/// How long a dispatched process may run before the harness forces a
/// preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSlice {
    /// Run until the process yields or terminates (FCFS, Priority).
    Unbounded,
    /// Run for at most this many ticks (Round-Robin quantum).
    Ticks(Ticks),
}

impl TimeSlice {
    /// Whether a process that has run `used` ticks has exhausted the slice.
    pub fn is_exhausted(self, used: Ticks) -> bool {
        match self {
            TimeSlice::Unbounded => false,
            TimeSlice::Ticks(n) => used >= n,
        }
    }
}

impl fmt::Display for TimeSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlice::Unbounded => write!(f, "inf"),
            TimeSlice::Ticks(n) => write!(f, "{n}"),
        }
    }
}
