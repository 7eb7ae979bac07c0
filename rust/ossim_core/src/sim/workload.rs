// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Workload definition, builder API and JSON loading.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::types::{Pid, Priority, Ticks};

/// One phase of a process's scripted behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Burst {
    /// Execute on a CPU for the given number of ticks.
    Cpu(Ticks),
    /// Block on I/O for the given number of ticks.
    Io(Ticks),
}

impl Burst {
    pub fn ticks(self) -> Ticks {
        match self {
            Burst::Cpu(t) | Burst::Io(t) => t,
        }
    }

    pub fn is_cpu(self) -> bool {
        matches!(self, Burst::Cpu(_))
    }
}

/// Definition of a simulated process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessDef {
    pub name: String,
    /// Lower value = higher priority. Only the priority policy looks at it.
    #[serde(default)]
    pub priority: Priority,
    /// Tick at which the process is admitted to the ready queue.
    #[serde(default)]
    pub arrival: Ticks,
    /// Alternating CPU and I/O bursts, starting and ending with CPU.
    pub bursts: Vec<Burst>,
}

impl ProcessDef {
    pub fn new(name: &str, priority: Priority, bursts: Vec<Burst>) -> Self {
        ProcessDef {
            name: name.to_string(),
            priority,
            arrival: 0,
            bursts,
        }
    }

    /// Convenience: a single CPU burst, no I/O.
    pub fn cpu_bound(name: &str, priority: Priority, ticks: Ticks) -> Self {
        Self::new(name, priority, vec![Burst::Cpu(ticks)])
    }

    pub fn arriving_at(mut self, arrival: Ticks) -> Self {
        self.arrival = arrival;
        self
    }

    /// Total CPU ticks the process needs.
    pub fn cpu_ticks(&self) -> Ticks {
        self.bursts
            .iter()
            .filter(|b| b.is_cpu())
            .map(|b| b.ticks())
            .sum()
    }

    fn validate(&self) -> Result<()> {
        let name = &self.name;
        match (self.bursts.first(), self.bursts.last()) {
            (Some(Burst::Cpu(_)), Some(Burst::Cpu(_))) => {}
            (None, _) => bail!("process {name:?} has no bursts"),
            _ => bail!("process {name:?} must start and end with a CPU burst"),
        }
        if self.bursts.iter().any(|b| b.ticks() == 0) {
            bail!("process {name:?} has a zero-length burst");
        }
        if self
            .bursts
            .windows(2)
            .any(|w| w[0].is_cpu() == w[1].is_cpu())
        {
            bail!("process {name:?} must alternate CPU and I/O bursts");
        }
        Ok(())
    }
}

/// A complete set of processes to simulate. The process at index `i` is
/// assigned `Pid(i)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workload {
    pub processes: Vec<ProcessDef>,
}

/// Builder for constructing workloads.
#[derive(Debug, Default)]
pub struct WorkloadBuilder {
    processes: Vec<ProcessDef>,
}

impl Workload {
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder::default()
    }

    /// Parse and validate a JSON workload:
    ///
    /// ```json
    /// { "processes": [
    ///     { "name": "editor", "priority": 2, "arrival": 0,
    ///       "bursts": [ {"cpu": 3}, {"io": 5}, {"cpu": 1} ] }
    /// ] }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let workload: Workload =
            serde_json::from_str(json).context("failed to parse workload JSON")?;
        workload.validate()?;
        Ok(workload)
    }

    /// Read a JSON workload from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid workload {}", path.display()))
    }

    /// The built-in mix: I/O-bound interactive processes at high priority
    /// and CPU-bound batch processes at low priority, some arriving late.
    pub fn standard() -> Self {
        use Burst::{Cpu, Io};

        let processes = vec![
            ProcessDef::new("webserver", 2, vec![Cpu(1), Io(4), Cpu(1), Io(4), Cpu(1)]),
            ProcessDef::new("shell", 1, vec![Cpu(1), Io(6), Cpu(2), Io(6), Cpu(1)]),
            ProcessDef::new("browser", 3, vec![Cpu(2), Io(3), Cpu(2), Io(3), Cpu(2)]),
            ProcessDef::new("matrix", 8, vec![Cpu(12)]),
            ProcessDef::new("compiler", 6, vec![Cpu(4), Io(2), Cpu(6)]).arriving_at(2),
            ProcessDef::new("circuit", 9, vec![Cpu(9), Io(1), Cpu(3)]).arriving_at(4),
            ProcessDef::new("database", 4, vec![Cpu(3), Io(5), Cpu(3), Io(5), Cpu(2)])
                .arriving_at(6),
            ProcessDef::new("editor", 2, vec![Cpu(1), Io(8), Cpu(1)]).arriving_at(8),
        ];
        Workload { processes }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Look up a definition by the PID the simulator assigns it.
    pub fn get(&self, pid: Pid) -> Option<&ProcessDef> {
        self.processes.get(pid.0 as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            bail!("workload must have at least one process");
        }
        for def in &self.processes {
            def.validate()?;
        }
        Ok(())
    }
}

impl WorkloadBuilder {
    /// Add a process with a full definition.
    pub fn process(mut self, def: ProcessDef) -> Self {
        self.processes.push(def);
        self
    }

    /// Convenience: add a CPU-bound process that arrives at tick 0.
    pub fn cpu_bound(self, name: &str, priority: Priority, ticks: Ticks) -> Self {
        self.process(ProcessDef::cpu_bound(name, priority, ticks))
    }

    /// Build and validate the workload.
    pub fn build(self) -> Result<Workload> {
        let workload = Workload {
            processes: self.processes,
        };
        workload.validate()?;
        Ok(workload)
    }
}
