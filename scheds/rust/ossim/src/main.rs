// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! ossim - Simulate a multi-CPU machine under an FCFS, round-robin or
//! preemptive priority process scheduler.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::info;
use ossim_core::{Policy, Report, SchedConfig, Simulator, Ticks, Workload};

const SIMULATOR_NAME: &str = "ossim";

/// Upper bound on simulated CPUs.
const MAX_CPUS: u32 = 16;

#[derive(Debug, clap::Parser)]
#[command(
    name = "ossim",
    version,
    disable_version_flag = true,
    about = "Multithreaded process scheduler simulator."
)]
struct Opts {
    /// Number of simulated CPUs (1-16).
    #[clap(required_unless_present = "version")]
    cpus: Option<u32>,

    /// Use round-robin scheduling with the given time slice in ticks.
    #[clap(short = 'r', long = "round-robin", value_name = "QUANTUM", conflicts_with_all = ["priority", "policy"])]
    round_robin: Option<Ticks>,

    /// Use preemptive priority scheduling.
    #[clap(short = 'p', long, action = clap::ArgAction::SetTrue, conflicts_with = "policy")]
    priority: bool,

    /// Scheduling policy by name: "fcfs", "rr[:QUANTUM]" or "priority".
    ///
    /// Equivalent to the -r and -p shortcuts. Without any of them the
    /// simulator uses first-come first-served.
    #[clap(long)]
    policy: Option<Policy>,

    /// Wall-clock length of one simulated tick in milliseconds.
    #[clap(short = 't', long, default_value = "100")]
    tick_ms: u64,

    /// JSON workload file. The built-in process mix is used when omitted.
    #[clap(short = 'w', long, value_name = "PATH")]
    workload: Option<PathBuf>,

    /// Print every trace event to stderr when the run ends.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    dump_trace: bool,

    /// Enable verbose output. Repeat for more detail.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print simulator version and exit.
    #[clap(short = 'V', long, action = clap::ArgAction::SetTrue)]
    version: bool,
}

impl Opts {
    fn policy(&self) -> Policy {
        if let Some(quantum) = self.round_robin {
            Policy::RoundRobin { quantum }
        } else if self.priority {
            Policy::Priority
        } else {
            self.policy.unwrap_or(Policy::Fcfs)
        }
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    if opts.version {
        println!("{} {}", SIMULATOR_NAME, env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loglevel = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };

    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Debug);
    simplelog::TermLogger::init(
        loglevel,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let cpus = opts.cpus.unwrap_or_default();
    if cpus == 0 || cpus > MAX_CPUS {
        bail!("number of CPUs must be between 1 and {MAX_CPUS}, got {cpus}");
    }
    if opts.tick_ms == 0 {
        bail!("--tick-ms must be positive");
    }
    let config = SchedConfig::new(cpus, opts.policy())?;

    let workload = match &opts.workload {
        Some(path) => Workload::load(path)?,
        None => Workload::standard(),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    info!(
        "{} {}: {} process(es), {} CPU(s), {}",
        SIMULATOR_NAME,
        env!("CARGO_PKG_VERSION"),
        workload.len(),
        config.nr_cpus(),
        config.policy()
    );

    let sim = Simulator::new(config)
        .tick(Duration::from_millis(opts.tick_ms))
        .with_shutdown(shutdown);
    let trace = sim.run(&workload)?;

    if opts.dump_trace {
        trace.dump();
    }

    let report = Report::new(*sim.config(), &workload, &trace);
    println!("{report}");

    if !report.all_terminated() {
        bail!("simulation stopped before every process terminated");
    }
    Ok(())
}
