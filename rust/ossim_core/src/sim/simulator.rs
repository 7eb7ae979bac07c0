// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Thread-driven simulation harness.
//!
//! This plays the part of the machine around the scheduling engine. It owns
//! the simulated CPUs and the clock and implements `Hardware`, so every
//! dispatch decision the engine makes lands here.
//!
//! Threads:
//! - one per CPU, executing the assigned process one tick at a time and
//!   raising `idle`/`preempt`/`yield_cpu`/`terminate` as bursts and slices
//!   run out;
//! - an I/O device, which receives I/O requests over a channel and calls
//!   `wake_up` when each one completes;
//! - an arrival thread admitting processes whose arrival tick is non-zero.
//!
//! A tick is a fixed slice of wall-clock time, so processes really do
//! execute concurrently on the CPU threads. Processes arriving at tick 0 are
//! admitted in definition order before any CPU starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::hardware::Hardware;
use crate::policy::SchedConfig;
use crate::process::Process;
use crate::scheduler::Scheduler;
use crate::sim::trace::{Trace, TraceKind};
use crate::sim::workload::{Burst, Workload};
use crate::types::{CpuId, Pid, Ticks, TimeSlice};

/// Default wall-clock length of a tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

type Engine = Scheduler<Arc<Machine>>;

/// What a CPU is currently executing.
#[derive(Debug, Clone)]
struct Assignment {
    process: Arc<Process>,
    slice: TimeSlice,
    /// Ticks run since the dispatch.
    used: Ticks,
}

/// Result of executing one tick of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    /// The current CPU burst has ticks left.
    Continue,
    /// The CPU burst finished and an I/O burst of this length follows.
    Io(Ticks),
    /// The last burst finished.
    Exit,
}

/// Cursor into a process's bursts.
#[derive(Debug)]
struct Script {
    bursts: Vec<Burst>,
    idx: usize,
    remaining: Ticks,
}

impl Script {
    fn new(bursts: &[Burst]) -> Self {
        Script {
            bursts: bursts.to_vec(),
            idx: 0,
            remaining: bursts.first().map_or(0, |b| b.ticks()),
        }
    }

    /// Consume one tick of the current CPU burst.
    ///
    /// Workloads are validated to alternate CPU and I/O bursts and to end
    /// with CPU, so an I/O burst is always followed by a CPU burst.
    fn run_tick(&mut self) -> TickOutcome {
        debug_assert!(self.bursts[self.idx].is_cpu());
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return TickOutcome::Continue;
        }
        self.idx += 1;
        match self.bursts.get(self.idx).copied() {
            None => TickOutcome::Exit,
            Some(io) => {
                self.idx += 1;
                self.remaining = self.bursts.get(self.idx).map_or(0, |b| b.ticks());
                TickOutcome::Io(io.ticks())
            }
        }
    }
}

struct IoRequest {
    process: Arc<Process>,
    ticks: Ticks,
}

/// Simulated CPUs, clock and trace. Implements `Hardware` for the engine.
struct Machine {
    start: Instant,
    tick: Duration,
    cpus: Vec<Mutex<Option<Assignment>>>,
    /// Outstanding preemption request per CPU, naming the process it is for.
    preempt_requested: Vec<Mutex<Option<Pid>>>,
    trace: Mutex<Trace>,
}

impl Machine {
    fn new(nr_cpus: u32, tick: Duration) -> Self {
        Machine {
            start: Instant::now(),
            tick,
            cpus: (0..nr_cpus).map(|_| Mutex::new(None)).collect(),
            preempt_requested: (0..nr_cpus).map(|_| Mutex::new(None)).collect(),
            trace: Mutex::new(Trace::new()),
        }
    }

    fn now(&self) -> Ticks {
        (self.start.elapsed().as_nanos() / self.tick.as_nanos().max(1)) as Ticks
    }

    fn duration(&self, ticks: Ticks) -> Duration {
        self.tick
            .saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX))
    }

    fn record(&self, cpu: Option<CpuId>, kind: TraceKind) {
        let mut trace = self.trace.lock().unwrap();
        trace.record(self.now(), cpu, kind);
    }

    fn assignment(&self, cpu: CpuId) -> Option<Assignment> {
        self.cpus[cpu.index()].lock().unwrap().clone()
    }

    /// Account one executed tick on `cpu`, returning the ticks used so far.
    fn charge(&self, cpu: CpuId) -> Ticks {
        let mut slot = self.cpus[cpu.index()].lock().unwrap();
        match slot.as_mut() {
            Some(run) => {
                run.used += 1;
                run.used
            }
            None => 0,
        }
    }

    /// Consume the request on `cpu`. True only if it was made for `pid`.
    fn take_preempt_request(&self, cpu: CpuId, pid: Pid) -> bool {
        self.preempt_requested[cpu.index()].lock().unwrap().take() == Some(pid)
    }
}

impl Hardware for Machine {
    fn context_switch(&self, cpu: CpuId, process: Option<Arc<Process>>, slice: TimeSlice) {
        {
            // A request for the incoming process may land between its
            // install in the run table and this call; keep that one.
            let mut req = self.preempt_requested[cpu.index()].lock().unwrap();
            if *req != process.as_ref().map(|p| p.id()) {
                *req = None;
            }
        }
        let kind = match &process {
            Some(p) => TraceKind::Dispatched { pid: p.id() },
            None => TraceKind::CpuIdle,
        };
        self.record(Some(cpu), kind);
        *self.cpus[cpu.index()].lock().unwrap() = process.map(|process| Assignment {
            process,
            slice,
            used: 0,
        });
    }

    fn force_preempt(&self, cpu: CpuId, pid: Pid) {
        *self.preempt_requested[cpu.index()].lock().unwrap() = Some(pid);
    }
}

/// State shared by every CPU thread.
struct CpuShared {
    sched: Arc<Engine>,
    machine: Arc<Machine>,
    scripts: HashMap<Pid, Mutex<Script>>,
    stopped: AtomicBool,
    remaining: AtomicUsize,
}

/// Runs a workload against a freshly constructed scheduler.
pub struct Simulator {
    config: SchedConfig,
    tick: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Simulator {
    pub fn new(config: SchedConfig) -> Self {
        Simulator {
            config,
            tick: DEFAULT_TICK,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the wall-clock length of a tick.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Stop the run early once `flag` is raised.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Run `workload` until every process terminates (or shutdown is
    /// requested) and return the trace.
    pub fn run(&self, workload: &Workload) -> Result<Trace> {
        workload.validate()?;

        let nr_cpus = self.config.nr_cpus();
        let machine = Arc::new(Machine::new(nr_cpus, self.tick));
        let sched = Arc::new(Scheduler::new(self.config, machine.clone()));

        let processes: Vec<(Ticks, Arc<Process>)> = workload
            .processes
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let pid = Pid(i as u32);
                (def.arrival, Process::new(pid, def.name.as_str(), def.priority))
            })
            .collect();

        let shared = Arc::new(CpuShared {
            sched: sched.clone(),
            machine: machine.clone(),
            scripts: workload
                .processes
                .iter()
                .enumerate()
                .map(|(i, def)| (Pid(i as u32), Mutex::new(Script::new(&def.bursts))))
                .collect(),
            stopped: AtomicBool::new(false),
            remaining: AtomicUsize::new(workload.len()),
        });

        info!(
            "simulating {} process(es) with {} on {} CPU(s), tick={:?}",
            workload.len(),
            self.config.policy(),
            nr_cpus,
            self.tick
        );

        let (initial, mut late): (Vec<_>, Vec<_>) =
            processes.into_iter().partition(|(arrival, _)| *arrival == 0);
        late.sort_by_key(|(arrival, _)| *arrival);
        for (_, process) in initial {
            machine.record(None, TraceKind::Arrived { pid: process.id() });
            sched.wake_up(process);
        }

        let (done_tx, done_rx) = channel::bounded::<()>(1);
        let (io_tx, io_rx) = channel::unbounded::<IoRequest>();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let mut cpu_threads = Vec::with_capacity(nr_cpus as usize);
        for i in 0..nr_cpus {
            let shared = shared.clone();
            let io_tx = io_tx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("cpu{i}"))
                .spawn(move || cpu_loop(CpuId(i), &shared, &io_tx, &done_tx))
                .context("failed to spawn CPU thread")?;
            cpu_threads.push(handle);
        }
        drop(done_tx);
        drop(io_tx);

        let io_thread = {
            let sched = sched.clone();
            let machine = machine.clone();
            thread::Builder::new()
                .name("io".into())
                .spawn(move || io_device(&sched, &machine, &io_rx))
                .context("failed to spawn I/O thread")?
        };

        let arrival_thread = if late.is_empty() {
            None
        } else {
            let sched = sched.clone();
            let machine = machine.clone();
            Some(
                thread::Builder::new()
                    .name("arrivals".into())
                    .spawn(move || admit_arrivals(&sched, &machine, late, &stop_rx))
                    .context("failed to spawn arrival thread")?,
            )
        };

        loop {
            match done_rx.recv_timeout(self.tick) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        warn!("simulation interrupted");
                        break;
                    }
                    if cpu_threads.iter().any(|h| h.is_finished()) {
                        warn!("a CPU thread exited early");
                        break;
                    }
                }
            }
        }

        shared.stopped.store(true, Ordering::Release);
        sched.shutdown();
        drop(stop_tx);

        let mut result = Ok(());
        for (i, handle) in cpu_threads.into_iter().enumerate() {
            if handle.join().is_err() {
                result = Err(anyhow!("cpu{i} thread panicked"));
            }
        }
        join_helper(io_thread, "io", &mut result);
        if let Some(handle) = arrival_thread {
            join_helper(handle, "arrivals", &mut result);
        }
        result?;

        let trace = std::mem::take(&mut *machine.trace.lock().unwrap());
        info!(
            "simulation finished after {} ticks, {} context switches",
            trace.end(),
            trace.context_switches()
        );
        Ok(trace)
    }
}

fn join_helper(handle: JoinHandle<()>, name: &str, result: &mut Result<()>) {
    if handle.join().is_err() && result.is_ok() {
        *result = Err(anyhow!("{name} thread panicked"));
    }
}

fn cpu_loop(cpu: CpuId, shared: &CpuShared, io_tx: &Sender<IoRequest>, done_tx: &Sender<()>) {
    let CpuShared {
        sched,
        machine,
        scripts,
        stopped,
        remaining,
    } = shared;
    debug!("cpu={cpu} online");

    while !stopped.load(Ordering::Acquire) {
        let Some(run) = machine.assignment(cpu) else {
            sched.idle(cpu);
            continue;
        };

        thread::sleep(machine.tick);
        let used = machine.charge(cpu);
        let pid = run.process.id();
        let outcome = scripts[&pid].lock().unwrap().run_tick();

        match outcome {
            TickOutcome::Exit => {
                machine.record(Some(cpu), TraceKind::Terminated { pid, ran: used });
                sched.terminate(cpu);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let _ = done_tx.try_send(());
                }
            }
            TickOutcome::Io(ticks) => {
                machine.record(Some(cpu), TraceKind::Yielded { pid, ran: used });
                // The process must be WAITING before the device can wake it.
                sched.yield_cpu(cpu);
                if io_tx
                    .send(IoRequest {
                        process: run.process,
                        ticks,
                    })
                    .is_err()
                {
                    break;
                }
            }
            TickOutcome::Continue => {
                if machine.take_preempt_request(cpu, pid) || run.slice.is_exhausted(used) {
                    machine.record(Some(cpu), TraceKind::Preempted { pid, ran: used });
                    sched.preempt(cpu);
                }
            }
        }
    }
    debug!("cpu={cpu} offline");
}

fn io_device(sched: &Engine, machine: &Machine, requests: &Receiver<IoRequest>) {
    // (completion time, submission order) -> process
    let mut pending: BTreeMap<(Instant, u64), Arc<Process>> = BTreeMap::new();
    let mut seq: u64 = 0;

    loop {
        let now = Instant::now();
        while pending
            .first_key_value()
            .is_some_and(|(&(deadline, _), _)| deadline <= now)
        {
            if let Some((_, process)) = pending.pop_first() {
                machine.record(None, TraceKind::Woke { pid: process.id() });
                sched.wake_up(process);
            }
        }

        let next = match pending.first_key_value() {
            Some((&(deadline, _), _)) => requests.recv_deadline(deadline),
            None => requests
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match next {
            Ok(req) => {
                let deadline = Instant::now() + machine.duration(req.ticks);
                pending.insert((deadline, seq), req.process);
                seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if !pending.is_empty() {
        debug!("io device stopped with {} request(s) in flight", pending.len());
    }
}

fn admit_arrivals(
    sched: &Engine,
    machine: &Machine,
    arrivals: Vec<(Ticks, Arc<Process>)>,
    stop: &Receiver<()>,
) {
    for (arrival, process) in arrivals {
        let deadline = machine.start + machine.duration(arrival);
        match stop.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => {
                machine.record(None, TraceKind::Arrived { pid: process.id() });
                sched.wake_up(process);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
