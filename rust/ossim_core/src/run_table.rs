// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Per-CPU record of the currently running process.

use std::sync::{Arc, Mutex};

use crate::process::Process;
use crate::types::{CpuId, Pid, Priority};

/// What one CPU is doing, as far as the engine knows.
#[derive(Debug, Clone, Default)]
struct Slot {
    process: Option<Arc<Process>>,
    /// A preemption of `process` has been requested and not yet carried
    /// out. Reset whenever the slot changes hands.
    preempting: bool,
}

/// One slot per CPU, each empty (idle) or holding the running process.
#[derive(Debug)]
pub struct RunTable {
    slots: Mutex<Vec<Slot>>,
}

impl RunTable {
    pub fn new(nr_cpus: u32) -> Self {
        RunTable {
            slots: Mutex::new(vec![Slot::default(); nr_cpus as usize]),
        }
    }

    pub fn nr_cpus(&self) -> u32 {
        self.slots.lock().unwrap().len() as u32
    }

    /// Record `process` as running on `cpu`, returning the previous occupant.
    pub fn install(&self, cpu: CpuId, process: Arc<Process>) -> Option<Arc<Process>> {
        let mut slots = self.slots.lock().unwrap();
        debug_assert!(
            !slots.iter().enumerate().any(|(i, s)| i != cpu.index()
                && s.process.as_ref().is_some_and(|p| p.id() == process.id())),
            "pid={} is already running on another CPU",
            process.id()
        );
        let slot = &mut slots[cpu.index()];
        slot.preempting = false;
        slot.process.replace(process)
    }

    /// Empty the slot for `cpu`, returning its occupant.
    pub fn clear(&self, cpu: CpuId) -> Option<Arc<Process>> {
        let slot = &mut self.slots.lock().unwrap()[cpu.index()];
        slot.preempting = false;
        slot.process.take()
    }

    pub fn current(&self, cpu: CpuId) -> Option<Arc<Process>> {
        self.slots.lock().unwrap()[cpu.index()].process.clone()
    }

    pub fn is_idle(&self, cpu: CpuId) -> bool {
        self.slots.lock().unwrap()[cpu.index()].process.is_none()
    }

    /// Whether a preemption requested on `cpu` is still outstanding.
    pub fn is_preempting(&self, cpu: CpuId) -> bool {
        self.slots.lock().unwrap()[cpu.index()].preempting
    }

    /// Snapshot of every occupied slot.
    pub fn running(&self) -> Vec<(CpuId, Arc<Process>)> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.process.clone().map(|p| (CpuId(i as u32), p)))
            .collect()
    }

    /// Pick a CPU to preempt given the priorities of the ready processes,
    /// in dispatch order, and mark it as preempting.
    ///
    /// Idle CPUs and CPUs already being preempted will each take one ready
    /// process off the head of the queue, so with `n` of them the first
    /// process left waiting is `ready[n]`. If it outranks something running,
    /// the CPU running the lowest-priority process is chosen; ties go to the
    /// lowest CPU ID. Equal priority never preempts.
    ///
    /// Returns the CPU and the PID it must give up.
    pub fn claim_preemption(&self, ready: &[Priority]) -> Option<(CpuId, Pid)> {
        let mut slots = self.slots.lock().unwrap();
        let available = slots
            .iter()
            .filter(|s| s.process.is_none() || s.preempting)
            .count();
        let waiting = *ready.get(available)?;

        let mut victim: Option<(usize, Priority)> = None;
        for (i, slot) in slots.iter().enumerate() {
            let Some(running) = slot.process.as_ref() else {
                continue;
            };
            if slot.preempting || running.priority() <= waiting {
                continue;
            }
            if victim.map_or(true, |(_, worst)| running.priority() > worst) {
                victim = Some((i, running.priority()));
            }
        }

        let (i, _) = victim?;
        let slot = &mut slots[i];
        slot.preempting = true;
        slot.process.as_ref().map(|p| (CpuId(i as u32), p.id()))
    }
}
