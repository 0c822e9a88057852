use anyhow::{anyhow, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use pathlab_map::Border;
use pathlab_runner::{HarnessConfig, SweepReport, TrialReport};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pathlab",
    version,
    about = "Map encoding, trial runs and benchmark sweeps for the distributed pathfinder"
)]
struct Cli {
    /// Directory the pathfinder runs in and writes its artifacts to.
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,
    /// Harness configuration (defaults to <workdir>/pathlab.yaml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a terrain image into a map file.
    EncodeMap {
        image: PathBuf,
        map: PathBuf,
        /// Write the grid without the surrounding cliff ring.
        #[arg(long)]
        no_border: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run the pathfinder once and collect its output.
    ///
    /// Everything after <MAP> goes to the pathfinder, so pathlab's own flags
    /// must come before <PROCS>.
    Run {
        #[arg(long)]
        json: bool,
        procs: u32,
        /// Terrain image, or a `.map` file.
        map: PathBuf,
        /// Options forwarded verbatim to the pathfinder.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
    /// Run every configured test case over a range of process counts.
    Sweep {
        min: u32,
        max: u32,
        #[arg(default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        step: u32,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(parse_error_exit_code(err.kind()));
        }
    };
    init_tracing(cli.verbose);

    let json_mode = command_json_mode(&cli.command);
    match run_command(&cli) {
        Ok(Some(payload)) => emit_json(&payload),
        Ok(None) => {}
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
            } else {
                eprintln!("error: {:#}", err);
            }
            std::process::exit(1);
        }
    }
}

fn parse_error_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    HarnessConfig::load(&cli.workdir, cli.config.as_deref())
}

fn run_command(cli: &Cli) -> Result<Option<Value>> {
    match &cli.command {
        Commands::EncodeMap {
            image,
            map,
            no_border,
            json,
        } => {
            let border = if *no_border {
                Border::None
            } else {
                Border::Cliff
            };
            let image = resolve_input(&cli.workdir, image);
            let map_path = resolve_input(&cli.workdir, map);
            let encoded = pathlab_map::encode_to_file(&image, &map_path, border)?;
            if *json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "encode-map",
                    "image": image.display().to_string(),
                    "map": map_path.display().to_string(),
                    "height": encoded.height,
                    "width": encoded.width,
                    "bordered": !no_border,
                })));
            }
            println!("map: {}", map_path.display());
            println!("header: {}", encoded.header());
        }
        Commands::Run {
            json,
            procs,
            map,
            options,
        } => {
            if let Some(flag) = misplaced_harness_flag(options) {
                return Err(anyhow!(
                    "{} was given after the map and would be passed to the pathfinder; place it before <PROCS>",
                    flag
                ));
            }
            let config = load_config(cli)?;
            let report = pathlab_runner::run_single_trial(config, *procs, map, options)?;
            if *json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "trial": trial_report_to_json(&report),
                })));
            }
            print_trial(&report);
        }
        Commands::Sweep {
            min,
            max,
            step,
            json,
        } => {
            let config = load_config(cli)?;
            let report = pathlab_runner::run_benchmark(config, *min, *max, *step)?;
            if *json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "sweep",
                    "sweep": serde_json::to_value(&report)?,
                })));
            }
            print_sweep(&report);
        }
    }
    Ok(None)
}

const HARNESS_FLAGS: &[&str] = &["--json", "--workdir", "--config", "--verbose"];

fn misplaced_harness_flag(options: &[String]) -> Option<&str> {
    options.iter().map(String::as_str).find(|opt| {
        HARNESS_FLAGS.iter().any(|flag| {
            *opt == *flag
                || opt
                    .strip_prefix(flag)
                    .map_or(false, |rest| rest.starts_with('='))
        })
    })
}

fn resolve_input(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::EncodeMap { json, .. }
        | Commands::Run { json, .. }
        | Commands::Sweep { json, .. } => *json,
    }
}

fn trial_report_to_json(report: &TrialReport) -> Value {
    serde_json::to_value(report).unwrap_or_else(|_| {
        json!({
            "output_dir": report.output_dir.display().to_string(),
            "status": report.status.as_str(),
        })
    })
}

fn print_trial(report: &TrialReport) {
    println!("procs: {}", report.procs);
    println!("map: {}", report.map_path.display());
    println!("map_generated: {}", report.map_generated);
    println!("options: {}", report.options.join(" "));
    println!("launch: {}", report.launch.as_str());
    println!("location_overlay: {}", report.location_overlay.as_str());
    println!("search_overlay: {}", report.search_overlay.as_str());
    println!("collected: {}", report.collected.len());
    if !report.missing.is_empty() {
        println!("missing: {}", report.missing.join(", "));
    }
    for dir in &report.new_directories {
        println!("new_directory: {}", dir.display());
    }
    println!("status: {}", report.status.as_str());
    println!("output_dir: {}", report.output_dir.display());
}

fn print_sweep(report: &SweepReport) {
    println!("benchmark_dir: {}", report.root.display());
    println!(
        "procs: {}..={} step {}",
        report.min_procs, report.max_procs, report.step
    );
    for trial in &report.trials {
        println!(
            "trial: {} procs={} status={} dir={}",
            trial.test,
            trial.procs,
            trial.status.as_str(),
            trial.dir.display()
        );
    }
    println!("trials: {}", report.trials.len());
    println!("partial: {}", report.partial_count());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pathlab").chain(args.iter().copied()))
    }

    #[test]
    fn run_forwards_hyphenated_options() {
        let cli = parse(&["run", "4", "medium_map.png", "-p", "-s", "-x", "494"]).expect("parse");
        match cli.command {
            Commands::Run {
                procs,
                map,
                options,
                json,
            } => {
                assert_eq!(procs, 4);
                assert_eq!(map, PathBuf::from("medium_map.png"));
                assert_eq!(options, vec!["-p", "-s", "-x", "494"]);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn json_flag_precedes_positionals() {
        let cli = parse(&["run", "--json", "2", "m.map"]).expect("parse");
        assert!(command_json_mode(&cli.command));
    }

    #[test]
    fn missing_arguments_are_errors() {
        assert!(parse(&["run", "4"]).is_err());
        assert!(parse(&["run"]).is_err());
        assert!(parse(&["sweep", "2"]).is_err());
        assert!(parse(&["encode-map", "only_image.png"]).is_err());
    }

    #[test]
    fn sweep_step_defaults_to_one_and_rejects_zero() {
        let cli = parse(&["sweep", "2", "8"]).expect("parse");
        match cli.command {
            Commands::Sweep { min, max, step, .. } => assert_eq!((min, max, step), (2, 8, 1)),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(parse(&["sweep", "2", "8", "0"]).is_err());
    }

    #[test]
    fn global_workdir_applies_to_subcommands() {
        let cli = parse(&["sweep", "1", "2", "--workdir", "/tmp/runs"]).expect("parse");
        assert_eq!(cli.workdir, PathBuf::from("/tmp/runs"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn argument_errors_exit_with_one() {
        let missing = parse(&["run", "4"]).expect_err("missing map");
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(parse_error_exit_code(missing.kind()), 1);

        let zero_step = parse(&["sweep", "2", "8", "0"]).expect_err("zero step");
        assert_eq!(parse_error_exit_code(zero_step.kind()), 1);

        let help = parse(&["--help"]).expect_err("help");
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse_error_exit_code(help.kind()), 0);

        let version = parse(&["--version"]).expect_err("version");
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);
        assert_eq!(parse_error_exit_code(version.kind()), 0);
    }

    #[test]
    fn harness_flags_after_the_map_are_caught() {
        let cli = parse(&["run", "2", "m.png", "-p", "--json"]).expect("parse");
        let Commands::Run { options, json, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(!json);
        assert_eq!(misplaced_harness_flag(&options), Some("--json"));

        let to_strings = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        assert_eq!(
            misplaced_harness_flag(&to_strings(&["-d", "1", "--workdir=/tmp"])),
            Some("--workdir=/tmp")
        );
        assert_eq!(
            misplaced_harness_flag(&to_strings(&["-p", "-s", "-x", "494", "--jsonish"])),
            None
        );
    }

    #[test]
    fn relative_inputs_resolve_against_workdir() {
        let wd = Path::new("/data/runs");
        assert_eq!(
            resolve_input(wd, Path::new("map.png")),
            PathBuf::from("/data/runs/map.png")
        );
        assert_eq!(
            resolve_input(wd, Path::new("/abs/map.png")),
            PathBuf::from("/abs/map.png")
        );
    }
}
