// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! ossim_core - Process scheduler for a simulated multi-CPU machine.
//!
//! The engine decides which process runs on which CPU under one of three
//! policies (first-come first-served, round-robin with a quantum, and
//! preemptive priority). It is driven concurrently by one thread per CPU and
//! by whatever completes I/O, and reports its decisions through the
//! `Hardware` trait.
//!
//! # Architecture
//!
//! - **Scheduler**: dispatcher plus the idle/preempt/yield/terminate/wake-up
//!   handlers
//! - **Ready queue**: FIFO or priority-ordered, with a blocking dequeue for
//!   idle CPUs
//! - **Run table**: which process each CPU is running
//! - **Sim**: a thread-per-CPU machine that executes scripted workloads and
//!   records a trace
//!
//! # Usage
//!
//! ```rust,no_run
//! use ossim_core::*;
//!
//! let config = SchedConfig::new(2, Policy::RoundRobin { quantum: 2 })?;
//! let workload = Workload::builder()
//!     .cpu_bound("a", 0, 5)
//!     .cpu_bound("b", 0, 5)
//!     .build()?;
//!
//! let trace = Simulator::new(config).run(&workload)?;
//! println!("{}", Report::new(config, &workload, &trace));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod hardware;
pub mod policy;
pub mod process;
pub mod ready_queue;
pub mod run_table;
pub mod scheduler;
pub mod sim;
pub mod types;

// Re-export the main public types for convenience.
pub use hardware::Hardware;
pub use policy::{Policy, SchedConfig};
pub use process::{Process, ProcessState};
pub use ready_queue::{QueueOrder, ReadyQueue};
pub use run_table::RunTable;
pub use scheduler::Scheduler;
pub use sim::{
    Burst, ProcessDef, ProcessReport, Report, Simulator, Trace, TraceEvent, TraceKind, Workload,
    WorkloadBuilder,
};
pub use types::{CpuId, Pid, Priority, Ticks, TimeSlice};
