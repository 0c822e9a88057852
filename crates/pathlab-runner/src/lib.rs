//! Orchestration around the distributed pathfinding program: single trials
//! (map resolution, launch, path overlays, artifact collection) and
//! benchmark sweeps over process counts.

use anyhow::Result;
use std::path::Path;

pub mod config;
pub mod fsutil;
pub mod sweep;
pub mod tools;
pub mod trial;
pub mod versioner;

pub use config::{HarnessConfig, LauncherConfig, OverlayConfig};
pub use sweep::{default_test_cases, run_sweep, SweepEntry, SweepPlan, SweepReport, TestCase};
pub use tools::{ExternalTools, OverlayRequest, ProcessTools, StepStatus};
pub use trial::{Coordinator, MapSource, TrialReport, TrialRunner, TrialStatus};
pub use versioner::{create_versioned_dir, next_available};

pub const DEFAULT_OUTPUT_BASE: &str = "output";

pub fn process_coordinator(config: HarnessConfig) -> Coordinator<ProcessTools> {
    let tools = ProcessTools::new(config.launcher.clone(), config.overlay.clone());
    Coordinator::new(config, tools)
}

pub fn run_single_trial(
    config: HarnessConfig,
    procs: u32,
    map: &Path,
    options: &[String],
) -> Result<TrialReport> {
    let mut coordinator = process_coordinator(config);
    coordinator.run_trial(procs, &MapSource::from_path(map), options)
}

/// Sweeps the configured test cases over `min..=max` process counts, placing
/// the benchmark root in the working directory.
pub fn run_benchmark(config: HarnessConfig, min: u32, max: u32, step: u32) -> Result<SweepReport> {
    let plan = SweepPlan {
        parent: config.workdir.clone(),
        min_procs: min,
        max_procs: max,
        step,
        tests: config.tests.clone(),
    };
    let mut coordinator = process_coordinator(config);
    run_sweep(&mut coordinator, &plan)
}
