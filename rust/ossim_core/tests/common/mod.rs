// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::collections::HashMap;
use std::time::Duration;

use log::LevelFilter;
use ossim_core::{CpuId, Pid, Trace, TraceKind, Workload};
use simplelog::{Config, TestLogger};

/// Tick used by the integration tests. Short enough to keep runs fast,
/// long enough that a tick dwarfs a dispatch.
pub const TEST_TICK: Duration = Duration::from_millis(2);

/// Initialize logging for a test.
///
/// `init()` only succeeds once per process; later calls are ignored.
pub fn setup_test() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

/// Walk the trace and check that the scheduling state machine was obeyed:
/// a process is dispatched only after becoming ready, never runs on two
/// CPUs at once, and every CPU runs at most one process at a time.
pub fn assert_trace_consistent(trace: &Trace) {
    let mut ready: HashMap<Pid, bool> = HashMap::new();
    let mut on_cpu: HashMap<Pid, CpuId> = HashMap::new();
    let mut cpu_busy: HashMap<CpuId, Pid> = HashMap::new();

    for e in trace.events() {
        match e.kind {
            TraceKind::Arrived { pid } | TraceKind::Woke { pid } => {
                assert!(!on_cpu.contains_key(&pid), "#{}: {pid} ready while running", e.seq);
                ready.insert(pid, true);
            }
            TraceKind::Dispatched { pid } => {
                let cpu = e.cpu.expect("dispatch without cpu");
                assert_eq!(ready.insert(pid, false), Some(true), "#{}: {pid} not ready", e.seq);
                assert!(on_cpu.insert(pid, cpu).is_none(), "#{}: {pid} on two cpus", e.seq);
                assert!(cpu_busy.insert(cpu, pid).is_none(), "#{}: cpu {cpu} double-booked", e.seq);
            }
            TraceKind::Preempted { pid, .. }
            | TraceKind::Yielded { pid, .. }
            | TraceKind::Terminated { pid, .. } => {
                let cpu = on_cpu.remove(&pid).expect("descheduled a process that was not running");
                assert_eq!(e.cpu, Some(cpu), "#{}: {pid} left the wrong cpu", e.seq);
                assert_eq!(cpu_busy.remove(&cpu), Some(pid));
                if matches!(e.kind, TraceKind::Preempted { .. }) {
                    ready.insert(pid, true);
                }
            }
            TraceKind::CpuIdle => {
                let cpu = e.cpu.expect("idle without cpu");
                assert!(!cpu_busy.contains_key(&cpu), "#{}: busy cpu {cpu} went idle", e.seq);
            }
        }
    }
}

/// Every process ran exactly as many ticks as its bursts ask for.
pub fn assert_all_completed(workload: &Workload, trace: &Trace) {
    for (i, def) in workload.processes.iter().enumerate() {
        let pid = Pid(i as u32);
        assert!(trace.terminated(pid), "{} did not terminate", def.name);
        assert_eq!(
            trace.run_ticks(pid),
            def.cpu_ticks(),
            "{} ran the wrong number of ticks",
            def.name
        );
    }
}
