use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sweep::TestCase;

/// Name of the configuration file looked up in the working directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pathlab.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LauncherConfig {
    /// Launcher program and the flag that precedes the process count.
    pub command: Vec<String>,
    pub executable: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command: vec!["mpiexec".to_string(), "-n".to_string()],
            executable: "orientation.exe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OverlayConfig {
    pub command: Vec<String>,
    pub location_color: [u8; 3],
    pub search_color: [u8; 3],
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            command: vec!["python".to_string(), "print_path_on_map.py".to_string()],
            location_color: [0, 191, 255],
            search_color: [255, 140, 0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestCaseEntry {
    map: PathBuf,
    #[serde(default)]
    options: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ConfigFile {
    launcher: LauncherConfig,
    overlay: OverlayConfig,
    output_base: String,
    tests: Option<Vec<TestCaseEntry>>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            launcher: LauncherConfig::default(),
            overlay: OverlayConfig::default(),
            output_base: crate::DEFAULT_OUTPUT_BASE.to_string(),
            tests: None,
        }
    }
}

/// Everything a trial or sweep needs to know about its environment.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory the external program runs in and writes its artifacts to.
    pub workdir: PathBuf,
    pub launcher: LauncherConfig,
    pub overlay: OverlayConfig,
    /// Base name handed to the versioner for trial output directories.
    pub output_base: String,
    pub tests: Vec<TestCase>,
}

impl HarnessConfig {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            launcher: LauncherConfig::default(),
            overlay: OverlayConfig::default(),
            output_base: crate::DEFAULT_OUTPUT_BASE.to_string(),
            tests: crate::sweep::default_test_cases(),
        }
    }

    /// Loads the configuration for `workdir`. An explicit `config_path` must
    /// exist; otherwise `pathlab.yaml` in the working directory is used when
    /// present and defaults apply when it is not.
    pub fn load(workdir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let workdir = workdir
            .canonicalize()
            .with_context(|| format!("working directory not found: {}", workdir.display()))?;

        let file = match config_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(anyhow!("config file not found: {}", path.display()));
                }
                Some(path.to_path_buf())
            }
            None => {
                let candidate = workdir.join(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let parsed = match &file {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                parse_config(&raw).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => ConfigFile::default(),
        };
        Self::from_file(workdir, parsed)
    }

    fn from_file(workdir: PathBuf, file: ConfigFile) -> Result<Self> {
        if file.launcher.executable.trim().is_empty() {
            return Err(anyhow!("launcher.executable must not be empty"));
        }
        if file.overlay.command.is_empty() {
            return Err(anyhow!("overlay.command must not be empty"));
        }
        if file.output_base.trim().is_empty() {
            return Err(anyhow!("output_base must not be empty"));
        }
        let tests = match file.tests {
            Some(entries) => entries
                .into_iter()
                .map(|e| TestCase::new(e.map, &e.options))
                .collect(),
            None => crate::sweep::default_test_cases(),
        };
        Ok(Self {
            workdir,
            launcher: file.launcher,
            overlay: file.overlay,
            output_base: file.output_base,
            tests,
        })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.workdir.join(path)
    }
}

fn parse_config(raw: &str) -> Result<ConfigFile> {
    if raw.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    Ok(serde_yaml::from_str(raw)?)
}
