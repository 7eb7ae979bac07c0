// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Process records.
//!
//! A `Process` is passive data shared by reference (`Arc<Process>`) between
//! the ready queue, the run table and whichever handler currently holds it.
//! The only mutable field is the scheduling state, which is updated
//! atomically and only along the edges of the process state machine.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::types::{Pid, Priority};

/// The scheduling state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessState {
    /// Created by the harness but not yet admitted to the ready queue.
    New = 0,
    /// Runnable, sitting in the ready queue.
    Ready = 1,
    /// Executing on a CPU (present in exactly one run-table slot).
    Running = 2,
    /// Blocked on I/O; owned by the harness until woken up.
    Waiting = 3,
    /// Finished. Absorbing.
    Terminated = 4,
}

impl ProcessState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ProcessState::New,
            1 => ProcessState::Ready,
            2 => ProcessState::Running,
            3 => ProcessState::Waiting,
            4 => ProcessState::Terminated,
            _ => unreachable!("invalid process state {raw}"),
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (New, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Waiting)
                | (Running, Terminated)
                | (Waiting, Ready)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::New => "NEW",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Waiting => "WAITING",
            ProcessState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// A process record.
#[derive(Debug)]
pub struct Process {
    id: Pid,
    name: String,
    priority: Priority,
    state: AtomicU8,
}

impl Process {
    /// Create a new process in the `New` state.
    pub fn new(id: Pid, name: impl Into<String>, priority: Priority) -> Arc<Self> {
        Arc::new(Process {
            id,
            name: name.into(),
            priority,
            state: AtomicU8::new(ProcessState::New as u8),
        })
    }

    pub fn id(&self) -> Pid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Move the process to `next`, returning the previous state.
    ///
    /// # Panics
    /// Panics if `next` is not reachable from the current state. Handlers
    /// only invoke transitions the harness contract guarantees are valid, so
    /// hitting this is a caller bug.
    pub fn transition(&self, next: ProcessState) -> ProcessState {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                ProcessState::from_raw(raw)
                    .can_transition(next)
                    .then_some(next as u8)
            })
            .unwrap_or_else(|raw| {
                panic!(
                    "pid={} ({}): invalid transition {} -> {}",
                    self.id,
                    self.name,
                    ProcessState::from_raw(raw),
                    next
                )
            });
        ProcessState::from_raw(prev)
    }
}
