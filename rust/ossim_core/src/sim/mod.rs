// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Multi-threaded machine simulation around the scheduling engine.

pub mod report;
pub mod simulator;
pub mod trace;
pub mod workload;

pub use report::{ProcessReport, Report};
pub use simulator::{Simulator, DEFAULT_TICK};
pub use trace::{Trace, TraceEvent, TraceKind};
pub use workload::{Burst, ProcessDef, Workload, WorkloadBuilder};
