// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Trace event recording for the simulator.
//!
//! Every scheduling action (dispatch, preemption, I/O yield, wake-up,
//! termination, CPU idle) is recorded as a `TraceEvent`. Events carry a
//! global sequence number, which is the order in which the harness observed
//! them, and the tick at which they happened.

use crate::types::{CpuId, Pid, Ticks};

/// A single trace event produced by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Position in the trace.
    pub seq: u64,
    /// Simulated time of the event.
    pub at: Ticks,
    /// The CPU on which this event occurred; `None` for arrivals and I/O
    /// completions.
    pub cpu: Option<CpuId>,
    pub kind: TraceKind,
}

/// The type of scheduling event recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// A process was admitted for the first time.
    Arrived { pid: Pid },
    /// A process was dispatched onto this CPU.
    Dispatched { pid: Pid },
    /// A process was preempted after running `ran` ticks.
    Preempted { pid: Pid, ran: Ticks },
    /// A process left the CPU for I/O after running `ran` ticks.
    Yielded { pid: Pid, ran: Ticks },
    /// A process finished its I/O and became ready.
    Woke { pid: Pid },
    /// A process completed all its bursts after running `ran` ticks.
    Terminated { pid: Pid, ran: Ticks },
    /// The CPU had nothing to run.
    CpuIdle,
}

impl TraceKind {
    pub fn pid(&self) -> Option<Pid> {
        match *self {
            TraceKind::Arrived { pid }
            | TraceKind::Dispatched { pid }
            | TraceKind::Preempted { pid, .. }
            | TraceKind::Yielded { pid, .. }
            | TraceKind::Woke { pid }
            | TraceKind::Terminated { pid, .. } => Some(pid),
            TraceKind::CpuIdle => None,
        }
    }

    /// Ticks of CPU time consumed, for events that end a run.
    fn ran(&self) -> Option<Ticks> {
        match *self {
            TraceKind::Preempted { ran, .. }
            | TraceKind::Yielded { ran, .. }
            | TraceKind::Terminated { ran, .. } => Some(ran),
            _ => None,
        }
    }
}

/// A complete simulation trace, containing all events in sequence order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, at: Ticks, cpu: Option<CpuId>, kind: TraceKind) {
        let seq = self.events.len() as u64;
        self.events.push(TraceEvent { seq, at, cpu, kind });
    }

    /// Get all events in sequence order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Events concerning `pid`, in sequence order.
    pub fn events_for(&self, pid: Pid) -> impl Iterator<Item = &TraceEvent> {
        self.events
            .iter()
            .filter(move |e| e.kind.pid() == Some(pid))
    }

    /// PIDs in the order they were dispatched (on any CPU).
    pub fn dispatch_order(&self) -> Vec<Pid> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                TraceKind::Dispatched { pid } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Number of times a process was dispatched.
    pub fn dispatch_count(&self, pid: Pid) -> usize {
        self.events_for(pid)
            .filter(|e| matches!(e.kind, TraceKind::Dispatched { .. }))
            .count()
    }

    /// Number of times a process was preempted.
    pub fn preempt_count(&self, pid: Pid) -> usize {
        self.events_for(pid)
            .filter(|e| matches!(e.kind, TraceKind::Preempted { .. }))
            .count()
    }

    /// Whether a process completed.
    pub fn terminated(&self, pid: Pid) -> bool {
        self.events_for(pid)
            .any(|e| matches!(e.kind, TraceKind::Terminated { .. }))
    }

    /// Total CPU ticks a process consumed.
    pub fn run_ticks(&self, pid: Pid) -> Ticks {
        self.events_for(pid).filter_map(|e| e.kind.ran()).sum()
    }

    /// Total number of dispatches, i.e. processes switched onto a CPU.
    pub fn context_switches(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Dispatched { .. }))
            .count()
    }

    /// Number of times a CPU went idle.
    pub fn idle_count(&self, cpu: CpuId) -> usize {
        self.events
            .iter()
            .filter(|e| e.cpu == Some(cpu) && matches!(e.kind, TraceKind::CpuIdle))
            .count()
    }

    /// Ticks a process spent in the ready queue: from each arrival, wake-up
    /// or preemption to the following dispatch.
    pub fn ready_ticks(&self, pid: Pid) -> Ticks {
        let mut total = 0;
        let mut ready_since: Option<Ticks> = None;
        for event in self.events_for(pid) {
            match event.kind {
                TraceKind::Arrived { .. }
                | TraceKind::Woke { .. }
                | TraceKind::Preempted { .. } => ready_since = Some(event.at),
                TraceKind::Dispatched { .. } => {
                    if let Some(since) = ready_since.take() {
                        total += event.at.saturating_sub(since);
                    }
                }
                _ => {}
            }
        }
        total
    }

    /// Tick of the last recorded event.
    pub fn end(&self) -> Ticks {
        self.events.last().map_or(0, |e| e.at)
    }

    /// Pretty-print the trace for debugging.
    pub fn dump(&self) {
        for event in &self.events {
            let desc = match event.kind {
                TraceKind::Arrived { pid } => format!("ARRIVE   pid={pid}"),
                TraceKind::Dispatched { pid } => format!("DISPATCH pid={pid}"),
                TraceKind::Preempted { pid, ran } => format!("PREEMPT  pid={pid} ran={ran}"),
                TraceKind::Yielded { pid, ran } => format!("IO       pid={pid} ran={ran}"),
                TraceKind::Woke { pid } => format!("WAKE     pid={pid}"),
                TraceKind::Terminated { pid, ran } => format!("EXIT     pid={pid} ran={ran}"),
                TraceKind::CpuIdle => "IDLE".to_string(),
            };
            let cpu = event
                .cpu
                .map_or_else(|| "-".to_string(), |c| c.0.to_string());
            eprintln!(
                "[{:>6}] #{:<5} cpu={:<3} {}",
                event.at, event.seq, cpu, desc
            );
        }
    }
}
