// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! End-of-run summary derived from a trace.

use std::fmt;

use crate::policy::SchedConfig;
use crate::sim::trace::Trace;
use crate::sim::workload::Workload;
use crate::types::{Pid, Priority, Ticks};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub pid: Pid,
    pub name: String,
    pub priority: Priority,
    pub dispatches: usize,
    pub preemptions: usize,
    pub run_ticks: Ticks,
    pub ready_ticks: Ticks,
    pub terminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub config: SchedConfig,
    pub context_switches: usize,
    /// Simulated time from start to the last recorded event.
    pub elapsed: Ticks,
    /// Sum of every process's time in the ready queue.
    pub ready_ticks: Ticks,
    pub processes: Vec<ProcessReport>,
}

impl Report {
    pub fn new(config: SchedConfig, workload: &Workload, trace: &Trace) -> Self {
        let processes: Vec<ProcessReport> = workload
            .processes
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let pid = Pid(i as u32);
                ProcessReport {
                    pid,
                    name: def.name.clone(),
                    priority: def.priority,
                    dispatches: trace.dispatch_count(pid),
                    preemptions: trace.preempt_count(pid),
                    run_ticks: trace.run_ticks(pid),
                    ready_ticks: trace.ready_ticks(pid),
                    terminated: trace.terminated(pid),
                }
            })
            .collect();

        Report {
            config,
            context_switches: trace.context_switches(),
            elapsed: trace.end(),
            ready_ticks: processes.iter().map(|p| p.ready_ticks).sum(),
            processes,
        }
    }

    pub fn all_terminated(&self) -> bool {
        self.processes.iter().all(|p| p.terminated)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} scheduler on {} CPU(s)",
            self.config.policy(),
            self.config.nr_cpus()
        )?;
        writeln!(
            f,
            "{:>4} {:<12} {:>4} {:>6} {:>7} {:>6} {:>6}",
            "PID", "NAME", "PRIO", "DISP", "PREEMPT", "RUN", "READY"
        )?;
        for p in &self.processes {
            writeln!(
                f,
                "{:>4} {:<12} {:>4} {:>6} {:>7} {:>6} {:>6}{}",
                p.pid.0,
                p.name,
                p.priority,
                p.dispatches,
                p.preemptions,
                p.run_ticks,
                p.ready_ticks,
                if p.terminated { "" } else { " (unfinished)" }
            )?;
        }
        writeln!(f)?;
        writeln!(f, "# of Context Switches: {}", self.context_switches)?;
        writeln!(f, "Total execution time: {} ticks", self.elapsed)?;
        write!(f, "Total time spent in READY state: {} ticks", self.ready_ticks)
    }
}
