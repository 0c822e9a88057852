use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use pathlab_map::{encode_to_file, Border, MAP_EXTENSION};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::fsutil::{atomic_write_json_pretty, list_dirs, move_path};
use crate::tools::{ExternalTools, OverlayRequest, StepStatus};
use crate::versioner::create_versioned_dir;

pub const LOCATION_PATH_FILE: &str = "location_finding.path";
pub const SEARCH_PATH_FILE: &str = "path_finding.path";
pub const STATISTICS_FILE: &str = "statistics.txt";
pub const OVERLAY_IMAGE_STEM: &str = "path_on_map";
pub const TRIAL_REPORT_FILE: &str = "trial.json";

pub fn process_log_file(rank: u32) -> String {
    format!("process_{}_log.txt", rank)
}

/// What a trial is started from: a terrain image that still needs encoding
/// (and can carry path overlays), or a ready map file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum MapSource {
    Image(PathBuf),
    MapFile(PathBuf),
}

impl MapSource {
    /// Paths ending in `.map` are map files, anything else is an image.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_map = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == MAP_EXTENSION)
            .unwrap_or(false);
        if is_map {
            MapSource::MapFile(path)
        } else {
            MapSource::Image(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            MapSource::Image(p) | MapSource::MapFile(p) => p,
        }
    }

    pub fn image(&self) -> Option<&Path> {
        match self {
            MapSource::Image(p) => Some(p),
            MapSource::MapFile(_) => None,
        }
    }
}

pub fn overlay_image_name(image: &Path) -> String {
    match image.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", OVERLAY_IMAGE_STEM, ext),
        None => OVERLAY_IMAGE_STEM.to_string(),
    }
}

pub fn artifact_names(procs: u32, source: &MapSource) -> Vec<String> {
    let mut names = vec![
        LOCATION_PATH_FILE.to_string(),
        SEARCH_PATH_FILE.to_string(),
        STATISTICS_FILE.to_string(),
    ];
    if let Some(image) = source.image() {
        names.push(overlay_image_name(image));
    }
    names.extend((0..procs).map(process_log_file));
    names
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Complete,
    /// Something failed or went missing; whatever was produced is kept.
    Partial,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Complete => "complete",
            TrialStatus::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub procs: u32,
    pub source: MapSource,
    pub map_path: PathBuf,
    pub map_generated: bool,
    pub options: Vec<String>,
    pub launch: StepStatus,
    pub location_overlay: StepStatus,
    pub search_overlay: StepStatus,
    pub collected: Vec<String>,
    pub missing: Vec<String>,
    /// Directories that appeared in the working directory while the program ran.
    pub new_directories: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub status: TrialStatus,
    pub started_at: String,
    pub finished_at: String,
}

impl TrialReport {
    fn aggregate_status(&self) -> TrialStatus {
        let clean = self.launch.is_success()
            && self.location_overlay.is_ok_or_skipped()
            && self.search_overlay.is_ok_or_skipped()
            && self.missing.is_empty();
        if clean {
            TrialStatus::Complete
        } else {
            TrialStatus::Partial
        }
    }
}

pub trait TrialRunner {
    fn run_trial(&mut self, procs: u32, source: &MapSource, options: &[String])
        -> Result<TrialReport>;
}

pub struct Coordinator<T> {
    config: HarnessConfig,
    tools: T,
}

impl<T: ExternalTools> Coordinator<T> {
    pub fn new(config: HarnessConfig, tools: T) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Returns the map file to hand to the program and whether it was
    /// generated by this call.
    fn resolve_map(&self, source: &MapSource) -> Result<(PathBuf, bool)> {
        match source {
            MapSource::MapFile(path) => {
                let resolved = self.config.resolve(path);
                if !resolved.is_file() {
                    return Err(anyhow!("map file not found: {}", resolved.display()));
                }
                Ok((resolved, false))
            }
            MapSource::Image(image) => {
                let image = self.config.resolve(image);
                let map_path = image.with_extension(MAP_EXTENSION);
                if map_path.is_file() {
                    info!(map = %map_path.display(), "map file found");
                    return Ok((map_path, false));
                }
                info!(image = %image.display(), "generating the map");
                encode_to_file(&image, &map_path, Border::Cliff).with_context(|| {
                    format!("error while generating the map from {}", image.display())
                })?;
                Ok((map_path, true))
            }
        }
    }

    fn overlay_paths(&mut self, image: &Path) -> (StepStatus, StepStatus) {
        let workdir = self.config.workdir.clone();
        let base_image = self.config.resolve(image);
        let annotated = workdir.join(overlay_image_name(image));

        let location = OverlayRequest {
            base_image,
            path_file: workdir.join(LOCATION_PATH_FILE),
            output_image: annotated.clone(),
            color: self.config.overlay.location_color,
        };
        let location_status = self.tools.overlay(&workdir, &location);

        let search = OverlayRequest {
            base_image: annotated.clone(),
            path_file: workdir.join(SEARCH_PATH_FILE),
            output_image: annotated,
            color: self.config.overlay.search_color,
        };
        let search_status = self.tools.overlay(&workdir, &search);
        (location_status, search_status)
    }

    fn snapshot_dirs(&self) -> BTreeSet<PathBuf> {
        list_dirs(&self.config.workdir).unwrap_or_else(|e| {
            warn!(error = %e, "cannot list working directory");
            BTreeSet::new()
        })
    }
}

impl<T: ExternalTools> TrialRunner for Coordinator<T> {
    fn run_trial(
        &mut self,
        procs: u32,
        source: &MapSource,
        options: &[String],
    ) -> Result<TrialReport> {
        let started_at = Utc::now().to_rfc3339();
        let (map_path, map_generated) = self.resolve_map(source)?;

        let mut full_options = vec!["-m".to_string(), map_path.to_string_lossy().to_string()];
        full_options.extend(options.iter().cloned());

        info!(
            procs,
            executable = %self.config.launcher.executable,
            options = %full_options.join(" "),
            "running trial"
        );
        let workdir = self.config.workdir.clone();
        let before = self.snapshot_dirs();
        let launch = self.tools.launch(&workdir, procs, &full_options);
        let after = self.snapshot_dirs();
        let new_directories: Vec<PathBuf> = after.difference(&before).cloned().collect();
        match new_directories.len() {
            0 | 1 => debug!(count = new_directories.len(), "directories created by the run"),
            n => warn!(count = n, "run created several directories; none is collected"),
        }

        let (location_overlay, search_overlay) = match source.image() {
            Some(image) => {
                info!("writing the paths");
                self.overlay_paths(image)
            }
            None => {
                let skipped = StepStatus::Skipped {
                    reason: "no source image".to_string(),
                };
                (skipped.clone(), skipped)
            }
        };

        let output_dir = create_versioned_dir(&workdir, &self.config.output_base)
            .with_context(|| format!("cannot create output directory in {}", workdir.display()))?;
        info!(dir = %output_dir.display(), "copying output files");

        let mut collected = Vec::new();
        let mut missing = Vec::new();
        for name in artifact_names(procs, source) {
            match move_path(&workdir.join(&name), &output_dir.join(&name)) {
                Ok(()) => {
                    debug!(file = %name, "collected");
                    collected.push(name);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %name, "not produced");
                    missing.push(name);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "cannot collect artifact");
                    missing.push(name);
                }
            }
        }

        let mut report = TrialReport {
            procs,
            source: source.clone(),
            map_path,
            map_generated,
            options: full_options,
            launch,
            location_overlay,
            search_overlay,
            collected,
            missing,
            new_directories,
            output_dir,
            status: TrialStatus::Partial,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        };
        report.status = report.aggregate_status();

        let report_path = report.output_dir.join(TRIAL_REPORT_FILE);
        if let Err(e) = atomic_write_json_pretty(&report_path, &report) {
            warn!(error = %e, "cannot write trial report");
        }
        info!(
            status = report.status.as_str(),
            launch = report.launch.as_str(),
            collected = report.collected.len(),
            missing = report.missing.len(),
            "trial finished"
        );
        Ok(report)
    }
}
