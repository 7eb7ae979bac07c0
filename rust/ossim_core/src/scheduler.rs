// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The scheduling engine: dispatcher and event handlers.
//!
//! A `Scheduler` is the single owned context holding the configuration,
//! the ready queue and the run table. The harness shares it (usually through
//! an `Arc`) with one thread per CPU plus whatever threads complete I/O, and
//! calls the five entry points as events happen:
//!
//! - `idle(cpu)`: the CPU has nothing to run; blocks until a process is ready.
//! - `preempt(cpu)`: the running process goes back to the ready queue.
//! - `yield_cpu(cpu)`: the running process blocks on I/O.
//! - `terminate(cpu)`: the running process is done.
//! - `wake_up(process)`: a new or I/O-blocked process becomes ready.
//!
//! All but `wake_up` end in a dispatch for the CPU, which is handed to
//! `Hardware::context_switch()`. The queue lock and the run-table lock are
//! never held together, and no engine lock is held while calling into the
//! hardware.

use std::sync::Arc;

use log::{debug, trace};

use crate::hardware::Hardware;
use crate::policy::{Policy, SchedConfig};
use crate::process::{Process, ProcessState};
use crate::ready_queue::{QueueOrder, ReadyQueue};
use crate::run_table::RunTable;
use crate::types::{CpuId, Pid, TimeSlice};

pub struct Scheduler<H: Hardware> {
    config: SchedConfig,
    ready: ReadyQueue,
    run_table: RunTable,
    hw: H,
}

impl<H: Hardware> Scheduler<H> {
    pub fn new(config: SchedConfig, hw: H) -> Self {
        let order = if config.policy().is_priority() {
            QueueOrder::Priority
        } else {
            QueueOrder::Fifo
        };
        Scheduler {
            config,
            ready: ReadyQueue::new(order),
            run_table: RunTable::new(config.nr_cpus()),
            hw,
        }
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn policy(&self) -> Policy {
        self.config.policy()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Select the next process for `cpu` and hand it to the hardware.
    ///
    /// Never blocks: with an empty ready queue the CPU is made idle.
    pub fn schedule(&self, cpu: CpuId) {
        let next = self.ready.dequeue();
        self.dispatch(cpu, next);
    }

    fn dispatch(&self, cpu: CpuId, next: Option<Arc<Process>>) {
        match next {
            None => {
                self.run_table.clear(cpu);
                trace!("cpu={cpu} idle");
                self.hw.context_switch(cpu, None, TimeSlice::Unbounded);
            }
            Some(process) => {
                process.transition(ProcessState::Running);
                self.run_table.install(cpu, process.clone());
                let slice = self.policy().time_slice();
                debug!(
                    "cpu={cpu} dispatch pid={} ({}) prio={} slice={slice}",
                    process.id(),
                    process.name(),
                    process.priority()
                );
                self.hw.context_switch(cpu, Some(process), slice);
            }
        }
    }

    /// Take the running process off `cpu`.
    ///
    /// # Panics
    /// Panics if the CPU is idle: the harness only reports events for a CPU
    /// whose process produced them.
    fn take_current(&self, cpu: CpuId, event: &str) -> Arc<Process> {
        self.run_table
            .clear(cpu)
            .unwrap_or_else(|| panic!("{event} on idle cpu={cpu}"))
    }

    /// `cpu` has nothing to run. Blocks until a process is ready and
    /// dispatches it.
    ///
    /// This is the only entry point that blocks. It returns without
    /// dispatching once the scheduler has been shut down.
    pub fn idle(&self, cpu: CpuId) {
        match self.ready.dequeue_blocking() {
            Some(process) => self.dispatch(cpu, Some(process)),
            None => debug!("cpu={cpu} released from idle by shutdown"),
        }
    }

    /// Return the process running on `cpu` to the ready queue and dispatch.
    ///
    /// Used for round-robin quantum expiry and for priority preemption. Under
    /// the priority policy a higher-priority process queued meanwhile is
    /// dispatched ahead of the preempted one.
    pub fn preempt(&self, cpu: CpuId) {
        let process = self.take_current(cpu, "preempt");
        debug!("cpu={cpu} preempt pid={}", process.id());
        process.transition(ProcessState::Ready);
        self.ready.enqueue(process);
        self.schedule(cpu);
    }

    /// The process running on `cpu` blocks on I/O. It is not re-queued; the
    /// harness returns it through `wake_up()` when the I/O completes.
    pub fn yield_cpu(&self, cpu: CpuId) {
        let process = self.take_current(cpu, "yield");
        debug!("cpu={cpu} yield pid={}", process.id());
        process.transition(ProcessState::Waiting);
        self.schedule(cpu);
    }

    /// The process running on `cpu` has finished.
    pub fn terminate(&self, cpu: CpuId) {
        let process = self.take_current(cpu, "terminate");
        debug!("cpu={cpu} terminate pid={}", process.id());
        process.transition(ProcessState::Terminated);
        self.schedule(cpu);
    }

    /// Make a new or I/O-blocked process ready.
    ///
    /// Under the priority policy this also checks whether a ready process
    /// is left waiting while something less important runs. Every idle CPU
    /// and every CPU already asked to preempt accounts for one process at
    /// the head of the queue; if the first process beyond those outranks a
    /// running one, the CPU running the least important process is asked to
    /// preempt it.
    pub fn wake_up(&self, process: Arc<Process>) {
        process.transition(ProcessState::Ready);
        let pid = process.id();
        debug!("wake_up pid={pid} prio={}", process.priority());
        self.ready.enqueue(process);

        if !self.policy().is_priority() {
            return;
        }
        let ready = self.ready.priorities();
        if let Some((victim, running)) = self.run_table.claim_preemption(&ready) {
            debug!("wake_up pid={pid} requests preemption of pid={running} on cpu={victim}");
            self.hw.force_preempt(victim, running);
        }
    }

    /// Release every CPU blocked in `idle()`. Further `idle()` calls return
    /// immediately.
    pub fn shutdown(&self) {
        debug!("scheduler shutdown");
        self.ready.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.ready.is_closed()
    }

    /// PIDs in the ready queue, in dispatch order.
    pub fn ready_pids(&self) -> Vec<Pid> {
        self.ready.pids()
    }

    pub fn current(&self, cpu: CpuId) -> Option<Arc<Process>> {
        self.run_table.current(cpu)
    }

    /// Snapshot of every busy CPU and its process.
    pub fn running(&self) -> Vec<(CpuId, Arc<Process>)> {
        self.run_table.running()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::types::Priority;

    #[derive(Default)]
    struct RecordingHw {
        switches: Mutex<Vec<(CpuId, Option<Pid>, TimeSlice)>>,
        preempts: Mutex<Vec<(CpuId, Pid)>>,
    }

    impl Hardware for RecordingHw {
        fn context_switch(&self, cpu: CpuId, process: Option<Arc<Process>>, slice: TimeSlice) {
            self.switches
                .lock()
                .unwrap()
                .push((cpu, process.map(|p| p.id()), slice));
        }

        fn force_preempt(&self, cpu: CpuId, pid: Pid) {
            self.preempts.lock().unwrap().push((cpu, pid));
        }
    }

    impl RecordingHw {
        fn last_switch(&self) -> (CpuId, Option<Pid>, TimeSlice) {
            *self.switches.lock().unwrap().last().unwrap()
        }
    }

    fn sched(nr_cpus: u32, policy: Policy) -> Scheduler<RecordingHw> {
        Scheduler::new(
            SchedConfig::new(nr_cpus, policy).unwrap(),
            RecordingHw::default(),
        )
    }

    fn proc(pid: u32, prio: Priority) -> Arc<Process> {
        Process::new(Pid(pid), format!("p{pid}"), prio)
    }

    #[test]
    fn test_fcfs_dispatch_order() {
        let s = sched(1, Policy::Fcfs);
        let a = proc(1, 9);
        let b = proc(2, 0);
        s.wake_up(a.clone());
        s.wake_up(b.clone());
        assert_eq!(s.ready_pids(), vec![Pid(1), Pid(2)]);

        s.idle(CpuId(0));
        assert_eq!(
            s.hardware().last_switch(),
            (CpuId(0), Some(Pid(1)), TimeSlice::Unbounded)
        );
        assert_eq!(a.state(), ProcessState::Running);
        assert_eq!(s.current(CpuId(0)).map(|p| p.id()), Some(Pid(1)));

        s.terminate(CpuId(0));
        assert_eq!(a.state(), ProcessState::Terminated);
        assert_eq!(s.hardware().last_switch().1, Some(Pid(2)));

        s.terminate(CpuId(0));
        assert_eq!(
            s.hardware().last_switch(),
            (CpuId(0), None, TimeSlice::Unbounded)
        );
        assert!(s.current(CpuId(0)).is_none());
        // FCFS never asks for preemption.
        assert!(s.hardware().preempts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_schedule_idles_on_empty_queue() {
        let s = sched(2, Policy::Fcfs);
        s.schedule(CpuId(1));
        assert_eq!(
            s.hardware().last_switch(),
            (CpuId(1), None, TimeSlice::Unbounded)
        );
        assert!(s.running().is_empty());
    }

    #[test]
    fn test_round_robin_requeues_at_tail() {
        let s = sched(1, Policy::RoundRobin { quantum: 3 });
        for pid in 1..=3 {
            s.wake_up(proc(pid, 0));
        }
        s.schedule(CpuId(0));
        assert_eq!(
            s.hardware().last_switch(),
            (CpuId(0), Some(Pid(1)), TimeSlice::Ticks(3))
        );

        s.preempt(CpuId(0));
        assert_eq!(s.hardware().last_switch().1, Some(Pid(2)));
        assert_eq!(s.ready_pids(), vec![Pid(3), Pid(1)]);

        s.preempt(CpuId(0));
        s.preempt(CpuId(0));
        assert_eq!(s.hardware().last_switch().1, Some(Pid(1)));
        assert_eq!(s.ready_pids(), vec![Pid(2), Pid(3)]);
    }

    #[test]
    fn test_yield_leaves_process_waiting() {
        let s = sched(1, Policy::Fcfs);
        let a = proc(1, 0);
        s.wake_up(a.clone());
        s.schedule(CpuId(0));

        s.yield_cpu(CpuId(0));
        assert_eq!(a.state(), ProcessState::Waiting);
        assert!(s.ready_pids().is_empty());
        assert_eq!(s.hardware().last_switch().1, None);

        s.wake_up(a.clone());
        assert_eq!(a.state(), ProcessState::Ready);
        assert_eq!(s.ready_pids(), vec![Pid(1)]);
    }

    #[test]
    fn test_priority_wake_up_preempts_lower_priority() {
        let s = sched(1, Policy::Priority);
        let a = proc(1, 5);
        let b = proc(2, 1);
        s.wake_up(a.clone());
        s.schedule(CpuId(0));
        assert!(s.hardware().preempts.lock().unwrap().is_empty());

        s.wake_up(b.clone());
        assert_eq!(
            *s.hardware().preempts.lock().unwrap(),
            vec![(CpuId(0), Pid(1))]
        );

        // The harness answers the request with preempt().
        s.preempt(CpuId(0));
        assert_eq!(s.hardware().last_switch().1, Some(Pid(2)));
        assert_eq!(a.state(), ProcessState::Ready);
        assert_eq!(b.state(), ProcessState::Running);
        assert_eq!(s.ready_pids(), vec![Pid(1)]);
    }

    #[test]
    fn test_priority_wake_up_skips_preemption() {
        let s = sched(2, Policy::Priority);
        s.wake_up(proc(1, 5));
        s.schedule(CpuId(0));

        // CPU 1 is idle: no preemption needed.
        s.wake_up(proc(2, 0));
        s.schedule(CpuId(1));

        // Both CPUs busy, but nothing runs at lower priority than 5.
        s.wake_up(proc(3, 5));
        s.wake_up(proc(4, 7));
        assert!(s.hardware().preempts.lock().unwrap().is_empty());

        // Only a strictly higher priority preempts.
        s.wake_up(proc(5, 1));
        assert_eq!(
            *s.hardware().preempts.lock().unwrap(),
            vec![(CpuId(0), Pid(1))]
        );
    }

    #[test]
    fn test_priority_wake_ups_beyond_idle_cpus_preempt() {
        let s = sched(2, Policy::Priority);
        s.wake_up(proc(1, 5));
        s.schedule(CpuId(0));

        // CPU 1 is idle and covers the first arrival only.
        s.wake_up(proc(2, 1));
        assert!(s.hardware().preempts.lock().unwrap().is_empty());
        s.wake_up(proc(3, 1));
        assert_eq!(
            *s.hardware().preempts.lock().unwrap(),
            vec![(CpuId(0), Pid(1))]
        );

        s.idle(CpuId(1));
        s.preempt(CpuId(0));
        let mut running: Vec<_> = s.running().iter().map(|(_, p)| p.id()).collect();
        running.sort();
        assert_eq!(running, vec![Pid(2), Pid(3)]);
        assert_eq!(s.ready_pids(), vec![Pid(1)]);
    }

    #[test]
    fn test_outstanding_preemption_is_not_requested_twice() {
        let s = sched(2, Policy::Priority);
        s.wake_up(proc(1, 5));
        s.schedule(CpuId(0));
        s.wake_up(proc(2, 4));
        s.schedule(CpuId(1));

        // Two urgent arrivals claim both CPUs, least important first.
        s.wake_up(proc(3, 0));
        s.wake_up(proc(4, 0));
        // A third has nothing left to claim.
        s.wake_up(proc(5, 0));
        assert_eq!(
            *s.hardware().preempts.lock().unwrap(),
            vec![(CpuId(0), Pid(1)), (CpuId(1), Pid(2))]
        );
    }

    #[test]
    fn test_config_selects_queue_order() {
        let s = sched(3, Policy::RoundRobin { quantum: 4 });
        assert_eq!(s.config().nr_cpus(), 3);
        assert_eq!(s.config().policy(), Policy::RoundRobin { quantum: 4 });
        // FIFO: priority is ignored.
        s.wake_up(proc(1, 9));
        s.wake_up(proc(2, 0));
        assert_eq!(s.ready_pids(), vec![Pid(1), Pid(2)]);
    }

    #[test]
    fn test_idle_blocks_until_wake_up() {
        let s = Arc::new(sched(1, Policy::Fcfs));
        let (tx, rx) = mpsc::channel();
        let cpu = {
            let s = s.clone();
            thread::spawn(move || {
                s.idle(CpuId(0));
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(s.hardware().switches.lock().unwrap().is_empty());

        s.wake_up(proc(7, 0));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        cpu.join().unwrap();
        assert_eq!(s.hardware().last_switch().1, Some(Pid(7)));
        assert_eq!(s.current(CpuId(0)).map(|p| p.id()), Some(Pid(7)));
    }

    #[test]
    fn test_shutdown_releases_idle_cpus() {
        let s = Arc::new(sched(2, Policy::Fcfs));
        let cpus: Vec<_> = (0..2)
            .map(|i| {
                let s = s.clone();
                thread::spawn(move || s.idle(CpuId(i)))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        s.shutdown();
        for c in cpus {
            c.join().unwrap();
        }
        assert!(s.is_shut_down());
        assert!(s.hardware().switches.lock().unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "preempt on idle cpu=0")]
    fn test_preempt_idle_cpu_is_fatal() {
        let s = sched(1, Policy::RoundRobin { quantum: 1 });
        s.preempt(CpuId(0));
    }
}
