use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;

use crate::fsutil::{atomic_write_json_pretty, move_path};
use crate::trial::{MapSource, TrialRunner, TrialStatus};
use crate::versioner::next_available;

pub const SWEEP_REPORT_FILE: &str = "sweep.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// File name of the map, e.g. `medium_map.png`.
    pub name: String,
    pub map: PathBuf,
    pub options: Vec<String>,
}

impl TestCase {
    pub fn new(map: impl Into<PathBuf>, options: &str) -> Self {
        let map = map.into();
        let name = map
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| map.to_string_lossy().to_string());
        Self {
            name,
            map,
            options: options.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn source(&self) -> MapSource {
        MapSource::from_path(&self.map)
    }

    /// `output_<map>_<procs>` followed by each option token, underscore
    /// separated. Path separators inside tokens become `-` so the name
    /// stays a single component.
    pub fn dir_name(&self, procs: u32) -> String {
        let mut parts = vec![
            "output".to_string(),
            self.name.clone(),
            procs.to_string(),
        ];
        parts.extend(self.options.iter().map(|t| t.replace(['/', '\\'], "-")));
        parts.join("_")
    }
}

pub fn default_test_cases() -> Vec<TestCase> {
    vec![TestCase::new("medium_map.png", "-p -s -x 494 -y 959 -d 1")]
}

#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub parent: PathBuf,
    pub min_procs: u32,
    pub max_procs: u32,
    pub step: u32,
    pub tests: Vec<TestCase>,
}

impl SweepPlan {
    pub fn process_counts(&self) -> impl Iterator<Item = u32> {
        (self.min_procs..=self.max_procs).step_by(self.step.max(1) as usize)
    }

    pub fn total_trials(&self) -> usize {
        self.process_counts().count() * self.tests.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
    pub test: String,
    pub procs: u32,
    pub options: Vec<String>,
    pub dir: PathBuf,
    pub status: TrialStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub root: PathBuf,
    pub min_procs: u32,
    pub max_procs: u32,
    pub step: u32,
    pub started_at: String,
    pub trials: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn partial_count(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Partial)
            .count()
    }
}

pub fn benchmark_dir_name(now: &DateTime<Local>) -> String {
    format!("benchmark_{}", now.format("%Y_%m_%d_%H_%M_%S"))
}

/// Runs every test case at every process count of `plan`, filing each
/// trial's output under a fresh `benchmark_<timestamp>` directory.
pub fn run_sweep<R: TrialRunner>(runner: &mut R, plan: &SweepPlan) -> Result<SweepReport> {
    run_sweep_at(runner, plan, Local::now())
}

pub fn run_sweep_at<R: TrialRunner>(
    runner: &mut R,
    plan: &SweepPlan,
    now: DateTime<Local>,
) -> Result<SweepReport> {
    if plan.step == 0 {
        return Err(anyhow!("sweep step must be at least 1"));
    }

    let root = plan.parent.join(benchmark_dir_name(&now));
    match fs::create_dir(&root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(anyhow!(
                "benchmark directory already exists: {}",
                root.display()
            ));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("cannot create {}", root.display()));
        }
    }
    info!(root = %root.display(), "benchmark results folder");
    info!(
        tests = plan.tests.len(),
        trials = plan.total_trials(),
        "running tests"
    );

    let mut report = SweepReport {
        root: root.clone(),
        min_procs: plan.min_procs,
        max_procs: plan.max_procs,
        step: plan.step,
        started_at: Utc::now().to_rfc3339(),
        trials: Vec::new(),
    };
    write_sweep_report(&report)?;

    for procs in plan.process_counts() {
        info!(procs, "running tests for process count");
        for test in &plan.tests {
            info!(test = %test.name, options = %test.options.join(" "), "running test");
            let trial = runner.run_trial(procs, &test.source(), &test.options)?;

            let dest = next_available(&root, &test.dir_name(procs));
            move_path(&trial.output_dir, &dest).with_context(|| {
                format!(
                    "cannot move {} to {}",
                    trial.output_dir.display(),
                    dest.display()
                )
            })?;

            report.trials.push(SweepEntry {
                test: test.name.clone(),
                procs,
                options: test.options.clone(),
                dir: dest,
                status: trial.status,
            });
            write_sweep_report(&report)?;
        }
    }

    info!(
        trials = report.trials.len(),
        partial = report.partial_count(),
        "sweep finished"
    );
    Ok(report)
}

fn write_sweep_report(report: &SweepReport) -> Result<()> {
    atomic_write_json_pretty(&report.root.join(SWEEP_REPORT_FILE), report)
}
