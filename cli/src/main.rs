mod commands;
mod logging;
mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use model_prune::{CleanupMode, ModelScanError, ReportError};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "model-prune")]
#[command(about = "Find unused columns and measures in a Power BI model and remove them safely")]
#[command(version)]
pub struct Cli {
    #[arg(long, short, global = true, help = "Verbose mode: log debug details to stderr")]
    pub verbose: bool,
    #[arg(long, short, global = true, help = "Quiet mode: only show errors and the summary")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Decide which columns and tables are removable and write SQL scripts")]
    Analyze {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, value_name = "DIR", help = "The model's definition/tables directory; keeps columns the model depends on")]
        tables: Option<PathBuf>,
        #[arg(long, short, value_enum, default_value = "text", help = "Summary format on stdout")]
        format: OutputFormat,
    },
    #[command(about = "Analyze, protect structural dependencies, then delete items from TMDL files")]
    Cleanup {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, value_name = "DIR", help = "The model's definition/tables directory")]
        tables: PathBuf,
        #[arg(long, value_enum, help = "Which removable items to delete (default: model-only)")]
        mode: Option<ModeArg>,
        #[arg(long, short, help = "Do not ask for confirmation")]
        yes: bool,
        #[arg(long, help = "Show the plan and stop without touching any file")]
        dry_run: bool,
        #[arg(long, short, value_enum, default_value = "text", help = "Summary format on stdout")]
        format: OutputFormat,
    },
}

#[derive(Args, Clone)]
pub struct InputArgs {
    #[arg(long, value_name = "CSV", help = "Report field usage table")]
    pub usage: PathBuf,
    #[arg(long, value_name = "DIR", help = "Directory holding Tables.csv, Columns.csv and Relations.csv")]
    pub catalog: PathBuf,
    #[arg(long, value_name = "CSV", help = "Manually protected columns (TableName, ColumnName)")]
    pub views: Option<PathBuf>,
    #[arg(long, value_name = "CSV", help = "Manually protected tables (TableName)")]
    pub security: Option<PathBuf>,
    #[arg(long, value_name = "CSV", help = "Tables protected by access-control rules (TableName)")]
    pub access_control: Option<PathBuf>,
    #[arg(long, short, value_name = "DIR", default_value = "prune-output", help = "Directory for generated files")]
    pub out: PathBuf,
    #[arg(long, value_name = "PATH", help = "JSON configuration file")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Database schema for generated SQL (overrides config)")]
    pub schema: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ModeArg {
    ModelOnly,
    All,
}

impl From<ModeArg> for CleanupMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ModelOnly => CleanupMode::ModelOnly,
            ModeArg::All => CleanupMode::All,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Analyze { inputs, tables, format } => {
            commands::analyze::run(&inputs, tables.as_deref(), format, cli.quiet)
        }
        Commands::Cleanup {
            inputs,
            tables,
            mode,
            yes,
            dry_run,
            format,
        } => commands::cleanup::run(
            &inputs,
            &tables,
            mode.map(CleanupMode::from),
            yes,
            dry_run,
            format,
            cli.quiet,
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for_error(&e)
        }
    }
}

fn exit_code_for_error(err: &anyhow::Error) -> ExitCode {
    if is_internal_error(err) {
        ExitCode::from(3)
    } else {
        ExitCode::from(2)
    }
}

/// Bad inputs, unresolved ids, invalid configuration and missing or
/// unreadable model files exit with 2; failures writing outputs or listing
/// the model directory exit with 3.
fn is_internal_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let scan_fault = cause
            .downcast_ref::<ModelScanError>()
            .is_some_and(|e| !e.is_input_error());
        cause.is::<ReportError>() || scan_fault || cause.is::<std::io::Error>()
    })
}
