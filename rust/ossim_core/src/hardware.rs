// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The machine the scheduler drives.
//!
//! The engine never executes anything itself. It decides, and hands the
//! decision to an implementation of `Hardware`, which owns the CPUs, the
//! clock, and the actual switching of execution contexts.

use std::sync::Arc;

use crate::process::Process;
use crate::types::{CpuId, Pid, TimeSlice};

/// Operations the engine consumes from its harness.
///
/// Both methods are called without any engine lock held.
pub trait Hardware: Send + Sync {
    /// Make `process` execute on `cpu` for at most `slice`, or make the CPU
    /// idle when `process` is `None`.
    ///
    /// Called exactly once per dispatch. An idle CPU must eventually be
    /// reported back through `Scheduler::idle()`; a bounded slice must end in
    /// `Scheduler::preempt()` unless the process yields or terminates first.
    fn context_switch(&self, cpu: CpuId, process: Option<Arc<Process>>, slice: TimeSlice);

    /// Ask for `Scheduler::preempt()` to be invoked on `cpu` as soon as
    /// possible, provided `cpu` is still running `pid`. A request that
    /// arrives after `pid` has left the CPU must be dropped. Must not block.
    fn force_preempt(&self, cpu: CpuId, pid: Pid);
}

impl<H: Hardware + ?Sized> Hardware for Arc<H> {
    fn context_switch(&self, cpu: CpuId, process: Option<Arc<Process>>, slice: TimeSlice) {
        (**self).context_switch(cpu, process, slice)
    }

    fn force_preempt(&self, cpu: CpuId, pid: Pid) {
        (**self).force_preempt(cpu, pid)
    }
}
