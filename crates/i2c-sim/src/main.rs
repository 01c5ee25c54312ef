//! CLI entry point for the I2C scenario runner.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use i2c_master_core as _;
use i2c_sim::{parse_script, run_script, RunOptions};
#[cfg(test)]
use tempfile as _;
use thiserror as _;

const USAGE_TEXT: &str = "\
Usage: i2c-sim <command> [options]

Commands:
  run <script> [--verbose]  Execute a transaction script against a simulated slave

Options:
  -v, --verbose  Print trace events for every step
  -h, --help     Show this help message

Exit status:
  0  all steps passed
  1  one or more steps failed
  2  usage or script errors

Examples:
  i2c-sim run scripts/eeprom_round_trip.i2c
  i2c-sim run scripts/eeprom_round_trip.i2c --verbose
";

const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    script: PathBuf,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ParseResult {
    Run(RunArgs),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    match first.to_string_lossy().as_ref() {
        "run" => parse_run_args(args).map(ParseResult::Run),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_run_args(args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut script: Option<PathBuf> = None;
    let mut verbose = false;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if script.is_some() {
            return Err("multiple script paths provided".to_string());
        }
        script = Some(PathBuf::from(arg));
    }

    let script = script.ok_or_else(|| "missing script path".to_string())?;
    Ok(RunArgs { script, verbose })
}

fn run(args: &RunArgs) -> Result<(), i32> {
    let source = fs::read_to_string(&args.script).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", args.script.display());
        EXIT_USAGE
    })?;

    let script = parse_script(&source).map_err(|e| {
        eprintln!("{}:{e}", args.script.display());
        EXIT_USAGE
    })?;

    let options = RunOptions {
        trace: args.verbose,
    };
    let report = run_script(&script, options).map_err(|e| {
        eprintln!("error: {e}");
        EXIT_USAGE
    })?;

    for step in &report.steps {
        println!("{step}");
        if args.verbose {
            for event in &step.trace {
                eprintln!("  {event:?}");
            }
        }
    }

    let summary = report.summary();
    println!();
    println!("Summary: {summary}");

    if report.all_passed() {
        Ok(())
    } else {
        Err(EXIT_FAILED)
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Run(args)) => match run(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
                0
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
                EXIT_USAGE
            }
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = OsString> {
        list.iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_run_command() {
        let result = parse_args(args(&["run", "demo.i2c", "--verbose"])).unwrap();
        assert_eq!(
            result,
            ParseResult::Run(RunArgs {
                script: PathBuf::from("demo.i2c"),
                verbose: true,
            })
        );
    }

    #[test]
    fn parses_help() {
        assert_eq!(parse_args(args(&["-h"])).unwrap(), ParseResult::Help);
        let err = parse_args(args(&["run", "--help"])).unwrap_err();
        assert!(err.starts_with("Usage:"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(parse_args(args(&[])).unwrap_err(), "missing command");
        assert_eq!(
            parse_args(args(&["load", "x"])).unwrap_err(),
            "unknown command: load"
        );
        assert_eq!(
            parse_args(args(&["run"])).unwrap_err(),
            "missing script path"
        );
        assert_eq!(
            parse_args(args(&["run", "a", "b"])).unwrap_err(),
            "multiple script paths provided"
        );
        assert_eq!(
            parse_args(args(&["run", "a", "--fast"])).unwrap_err(),
            "unknown option: --fast"
        );
    }
}
