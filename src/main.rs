use std::io::{self, IsTerminal, StdinLock};
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use rulelint::cmd::load::RuleInputArgs;
use rulelint::cmd::{check, dump};
use rulelint::domain::report::{PipelineInput, PipelineInputSource, PipelineReport};
use rulelint::io::Format;
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "RULELINT_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "rulelint",
    version,
    about = "Pre-flight validator for alerting and recording rule files"
)]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    emit_pipeline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate rule files and print a JSON report.
    Check(InputArgs),
    /// Print accepted rule namespaces as multi-document YAML.
    Dump(InputArgs),
}

#[derive(Debug, clap::Args)]
struct InputArgs {
    /// Rule file or directory; `-` or no value reads stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum)]
    from: Option<CliInputFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInputFormat {
    Yaml,
    Hcl,
}

impl From<CliInputFormat> for Format {
    fn from(value: CliInputFormat) -> Self {
        match value {
            CliInputFormat::Yaml => Self::Yaml,
            CliInputFormat::Hcl => Self::Hcl,
        }
    }
}

impl From<InputArgs> for RuleInputArgs {
    fn from(value: InputArgs) -> Self {
        Self {
            input: value.input,
            from: value.from.map(Into::into),
        }
    }
}

#[derive(Serialize)]
struct CliError<'a> {
    error: &'a str,
    message: String,
    code: i32,
    details: Value,
}

fn main() {
    init_tracing();
    process::exit(run());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return handle_parse_error(error),
    };

    let emit_pipeline = cli.emit_pipeline;
    match cli.command {
        Commands::Check(args) => run_check(args.into(), emit_pipeline),
        Commands::Dump(args) => run_dump(args.into(), emit_pipeline),
    }
}

fn handle_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{error}");
            0
        }
        _ => {
            emit_error(
                "input_usage_error",
                error.to_string(),
                json!({"kind": "cli_parse_error"}),
                3,
            );
            3
        }
    }
}

fn run_check(args: RuleInputArgs, emit_pipeline: bool) -> i32 {
    let response = check::run_with_stdin(&args, piped_stdin());

    let exit_code = match response.exit_code {
        0 | 2 => {
            if emit_json_stdout(&response.payload) {
                response.exit_code
            } else {
                emit_error(
                    "internal_error",
                    "failed to serialize check response".to_string(),
                    json!({"command": "check"}),
                    1,
                );
                1
            }
        }
        3 | 1 => {
            let code = response.exit_code;
            let error = response.payload["error"]
                .as_str()
                .unwrap_or("internal_error")
                .to_string();
            let message = response.payload["message"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            emit_error(&error, message, input_details("check", &args), code);
            code
        }
        other => {
            emit_error(
                "internal_error",
                format!("unexpected check exit code: {other}"),
                json!({"command": "check"}),
                1,
            );
            1
        }
    };

    if emit_pipeline {
        emit_pipeline_report(&build_pipeline_report(
            "check",
            &args,
            check::pipeline_steps(),
            check::deterministic_guards(),
        ));
    }
    exit_code
}

fn run_dump(args: RuleInputArgs, emit_pipeline: bool) -> i32 {
    let stdout = io::stdout();
    let exit_code = match dump::run(&args, piped_stdin(), stdout.lock()) {
        Ok(report) if report.valid => 0,
        Ok(_) => 2,
        Err(error) => {
            emit_error(
                error.kind(),
                error.to_string(),
                input_details("dump", &args),
                error.exit_code(),
            );
            error.exit_code()
        }
    };

    if emit_pipeline {
        emit_pipeline_report(&build_pipeline_report(
            "dump",
            &args,
            dump::pipeline_steps(),
            dump::deterministic_guards(),
        ));
    }
    exit_code
}

/// Stdin is only offered to commands when something is piped in.
fn piped_stdin() -> Option<StdinLock<'static>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        None
    } else {
        Some(stdin.lock())
    }
}

fn input_details(command: &str, args: &RuleInputArgs) -> Value {
    match args.input_path() {
        Some(path) => json!({"command": command, "input": path}),
        None => json!({"command": command, "input": "stdin"}),
    }
}

fn build_pipeline_report(
    command: &str,
    args: &RuleInputArgs,
    steps: Vec<String>,
    deterministic_guards: Vec<String>,
) -> PipelineReport {
    let format = args.resolve_format().ok().map(Format::as_str);
    let source = match args.input_path() {
        Some(path) => PipelineInputSource::path("input", path.display().to_string(), format),
        None => PipelineInputSource::stdin("input", format),
    };
    PipelineReport::new(
        command,
        PipelineInput::new(vec![source]),
        steps,
        deterministic_guards,
    )
}

fn emit_json_stdout(value: &Value) -> bool {
    match serde_json::to_string(value) {
        Ok(serialized) => {
            println!("{serialized}");
            true
        }
        Err(_) => false,
    }
}

fn emit_pipeline_report(report: &PipelineReport) {
    match serde_json::to_string(report) {
        Ok(serialized) => eprintln!("{serialized}"),
        Err(error) => emit_error(
            "internal_error",
            format!("failed to serialize pipeline report: {error}"),
            json!({"command": "emit_pipeline"}),
            1,
        ),
    }
}

fn emit_error(error: &str, message: String, details: Value, code: i32) {
    let payload = CliError {
        error,
        message,
        code,
        details,
    };
    match serde_json::to_string(&payload) {
        Ok(serialized) => eprintln!("{serialized}"),
        Err(_) => eprintln!(
            "{{\"error\":\"internal_error\",\"message\":\"failed to serialize error\",\"code\":1}}"
        ),
    }
}
