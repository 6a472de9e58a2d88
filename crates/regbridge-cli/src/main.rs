//! CLI entry point for the `regbridge` binary.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use log::LevelFilter;
use regbridge_cli::logger;
use regbridge_cli::runner::{run_script, RunReport, RunnerConfig};
use regbridge_cli::script::{parse_number, Script};
use regbridge_core::{encode_break, FrameEncoder, Reply, DEFAULT_ADDRESS_FIELD_BYTES};
#[cfg(test)]
use tempfile as _;
use thiserror as _;

const USAGE_TEXT: &str = "\
Usage: regbridge <command> [options]

Commands:
  run <script> [options]           Feed a stimulus script through the bridge
  encode read <addr>               Print the frame for a register read
  encode write <addr> <value>      Print the frame for a register write
  encode break                     Print the abort frame

Options:
  --drain <steps>          Idle steps allowed after the script (run only)
  --timeout <steps>        Read acknowledge timeout in steps
  --address-bytes <n>      Address field width, 1 to 4 bytes
  --skip-leading-nulls     Drop zero bytes before the first byte of a field
  -v, --verbose            Log bridge activity to stderr (run only)
  -h, --help               Show this help message

Examples:
  regbridge run session.txt
  regbridge encode read 0xE7
  regbridge encode write 2 0xAAE755AA --address-bytes 2
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    Encode(EncodeArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    input: PathBuf,
    config: RunnerConfig,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Read { addr: u16 },
    Write { addr: u16, value: u32 },
    Break,
}

#[derive(Debug, PartialEq, Eq)]
struct EncodeArgs {
    frame: Frame,
    address_field_bytes: usize,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "run" => parse_run_args(args)
            .map(Command::Run)
            .map(ParseResult::Command),
        "encode" => parse_encode_args(args)
            .map(Command::Encode)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn option_value<T: TryFrom<u64>>(
    args: &mut impl Iterator<Item = OsString>,
    name: &str,
) -> Result<T, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("missing value for {name}"))?;
    let text = value.to_string_lossy();
    parse_number(&text)
        .and_then(|number| T::try_from(number).ok())
        .ok_or_else(|| format!("invalid value for {name}: {text}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_run_args(mut args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut config = RunnerConfig::default();
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg == "--drain" {
            config.drain_steps = option_value(&mut args, "--drain")?;
            continue;
        }

        if arg == "--timeout" {
            config.bridge.read_timeout_steps = option_value(&mut args, "--timeout")?;
            continue;
        }

        if arg == "--address-bytes" {
            config.bridge.parser.address_field_bytes = option_value(&mut args, "--address-bytes")?;
            continue;
        }

        if arg == "--skip-leading-nulls" {
            config.bridge.parser.skip_leading_nulls = true;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(RunArgs {
        input,
        config,
        verbose,
    })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_encode_args(mut args: impl Iterator<Item = OsString>) -> Result<EncodeArgs, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut address_field_bytes = DEFAULT_ADDRESS_FIELD_BYTES;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--address-bytes" {
            address_field_bytes = option_value(&mut args, "--address-bytes")?;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        positional.push(arg.to_string_lossy().to_string());
    }

    let number = |text: &str, name: &str| {
        parse_number(text).ok_or_else(|| format!("invalid {name}: {text}"))
    };
    let address = |text: &str| {
        number(text, "address")
            .and_then(|value| u16::try_from(value).map_err(|_| format!("address out of range: {text}")))
    };

    let frame = match positional
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .as_slice()
    {
        ["read", addr] => Frame::Read {
            addr: address(*addr)?,
        },
        ["write", addr, value] => Frame::Write {
            addr: address(*addr)?,
            value: number(*value, "value").and_then(|value| {
                u32::try_from(value).map_err(|_| format!("value out of range: {value:#x}"))
            })?,
        },
        ["break"] => Frame::Break,
        [] => return Err("missing frame kind".to_string()),
        _ => return Err(format!("invalid encode arguments: {}", positional.join(" "))),
    };

    Ok(EncodeArgs {
        frame,
        address_field_bytes,
    })
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_report(report: &RunReport) {
    println!("output: {}", format_hex(&report.output));
    for reply in &report.replies {
        match reply {
            Reply::Data(word) => println!("reply: data 0x{word:08X}"),
            Reply::Break => println!("reply: break"),
        }
    }
    for (line, anomaly) in &report.anomalies {
        eprintln!("line {line}: warning: {anomaly:?}");
    }
    println!("steps: {}", report.steps);
}

fn run_session(args: &RunArgs) -> Result<(), i32> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(e) = logger::init(level) {
        eprintln!("error: failed to install logger: {e}");
        return Err(1);
    }

    let script = match Script::load(&args.input) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("{}: error: {e}", args.input.display());
            return Err(1);
        }
    };

    let report = match run_script(&script, &args.config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return Err(1);
        }
    };

    print_report(&report);

    if let Some(violation) = report.violation {
        eprintln!(
            "{}:{}: error: {}",
            args.input.display(),
            violation.line,
            violation.violation
        );
        return Err(1);
    }
    if !report.drained {
        eprintln!(
            "warning: bridge still busy after {} drain steps",
            args.config.drain_steps
        );
    }

    Ok(())
}

fn run_encode(args: &EncodeArgs) -> Result<(), i32> {
    let encoder = match FrameEncoder::new(args.address_field_bytes) {
        Ok(encoder) => encoder,
        Err(e) => {
            eprintln!("error: {e}");
            return Err(1);
        }
    };

    let frame = match args.frame {
        Frame::Read { addr } => encoder.read(addr),
        Frame::Write { addr, value } => encoder.write(addr, value),
        Frame::Break => Ok(encode_break().to_vec()),
    };

    match frame {
        Ok(bytes) => {
            println!("{}", format_hex(&bytes));
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {e}");
            Err(1)
        }
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Run(args))) => match run_session(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::Encode(args))) => match run_encode(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
