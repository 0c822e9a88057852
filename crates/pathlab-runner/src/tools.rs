use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{info, warn};

use crate::config::{LauncherConfig, OverlayConfig};

/// Outcome of one external invocation. Failures are recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// Non-zero exit; `code` is `None` when the process was killed by a signal.
    Failed { code: Option<i32> },
    NotStarted { reason: String },
    Skipped { reason: String },
}

impl StepStatus {
    pub fn from_exit(status: ExitStatus) -> Self {
        if status.success() {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed {
                code: status.code(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }

    /// True when the step did not go wrong, i.e. it succeeded or did not apply.
    pub fn is_ok_or_skipped(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed { .. } => "failed",
            StepStatus::NotStarted { .. } => "not_started",
            StepStatus::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRequest {
    pub base_image: PathBuf,
    pub path_file: PathBuf,
    pub output_image: PathBuf,
    pub color: [u8; 3],
}

/// The external programs a trial drives. Both calls block until the program
/// exits and run with `workdir` as the current directory.
pub trait ExternalTools {
    fn launch(&mut self, workdir: &Path, procs: u32, options: &[String]) -> StepStatus;

    fn overlay(&mut self, workdir: &Path, request: &OverlayRequest) -> StepStatus;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessTools {
    launcher: LauncherConfig,
    overlay: OverlayConfig,
}

impl ProcessTools {
    pub fn new(launcher: LauncherConfig, overlay: OverlayConfig) -> Self {
        Self { launcher, overlay }
    }

    pub fn launch_command(&self, procs: u32, options: &[String]) -> Vec<String> {
        let mut parts = self.launcher.command.clone();
        parts.push(procs.to_string());
        parts.push(self.launcher.executable.clone());
        parts.extend(options.iter().cloned());
        parts
    }

    pub fn overlay_command(&self, request: &OverlayRequest) -> Vec<String> {
        let mut parts = self.overlay.command.clone();
        parts.push(request.base_image.to_string_lossy().to_string());
        parts.push(request.path_file.to_string_lossy().to_string());
        parts.push(request.output_image.to_string_lossy().to_string());
        parts.extend(request.color.iter().map(|c| c.to_string()));
        parts
    }
}

impl ExternalTools for ProcessTools {
    fn launch(&mut self, workdir: &Path, procs: u32, options: &[String]) -> StepStatus {
        run_blocking(workdir, &self.launch_command(procs, options))
    }

    fn overlay(&mut self, workdir: &Path, request: &OverlayRequest) -> StepStatus {
        run_blocking(workdir, &self.overlay_command(request))
    }
}

fn run_blocking(workdir: &Path, command: &[String]) -> StepStatus {
    let Some((program, args)) = command.split_first() else {
        return StepStatus::NotStarted {
            reason: "empty command".to_string(),
        };
    };
    info!(cwd = %workdir.display(), "exec: {}", shell_join(command));

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.current_dir(workdir);
    cmd.stdin(Stdio::null());

    match cmd.status() {
        Ok(status) => {
            let step = StepStatus::from_exit(status);
            if !step.is_success() {
                warn!(command = %program, ?status, "external step failed");
            }
            step
        }
        Err(e) => {
            warn!(command = %program, error = %e, "external step could not start");
            StepStatus::NotStarted {
                reason: e.to_string(),
            }
        }
    }
}

pub fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn launch_command_places_count_before_executable() {
        let tools = ProcessTools::default();
        let cmd = tools.launch_command(4, &strings(&["-m", "medium_map.map", "-p"]));
        assert_eq!(
            cmd,
            strings(&["mpiexec", "-n", "4", "orientation.exe", "-m", "medium_map.map", "-p"])
        );
    }

    #[test]
    fn overlay_command_appends_color_channels() {
        let tools = ProcessTools::default();
        let req = OverlayRequest {
            base_image: PathBuf::from("map.png"),
            path_file: PathBuf::from("location_finding.path"),
            output_image: PathBuf::from("path_on_map.png"),
            color: [0, 191, 255],
        };
        assert_eq!(
            tools.overlay_command(&req),
            strings(&[
                "python",
                "print_path_on_map.py",
                "map.png",
                "location_finding.path",
                "path_on_map.png",
                "0",
                "191",
                "255"
            ])
        );
    }

    #[test]
    fn shell_join_quotes_only_when_needed() {
        let joined = shell_join(&strings(&["mpiexec", "-n", "2", "a b", "it's", ""]));
        assert_eq!(joined, "mpiexec -n 2 'a b' 'it'\"'\"'s' ''");
    }

    #[test]
    fn empty_and_missing_programs_do_not_start() {
        let dir = std::env::temp_dir();
        assert!(matches!(
            run_blocking(&dir, &[]),
            StepStatus::NotStarted { .. }
        ));
        assert!(matches!(
            run_blocking(&dir, &strings(&["pathlab-no-such-program-xyz"])),
            StepStatus::NotStarted { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn exit_codes_map_to_step_status() {
        let dir = std::env::temp_dir();
        assert_eq!(
            run_blocking(&dir, &strings(&["sh", "-c", "exit 0"])),
            StepStatus::Succeeded
        );
        assert_eq!(
            run_blocking(&dir, &strings(&["sh", "-c", "exit 3"])),
            StepStatus::Failed { code: Some(3) }
        );
    }
}
