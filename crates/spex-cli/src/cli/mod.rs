mod commands;
mod helpers;

use clap::Parser;
use spex_core::domain::SpexError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("ERROR: {error}");
            error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "spextools-rs", about = "OGIP to SPEX spectral data converter")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Convert OGIP spectra and response files to spo and res format
    Convert(commands::ConvertArgs),
    /// Generate spo and res files from a response alone, using a dummy
    /// unit-rate spectrum
    Simulate(commands::SimulateArgs),
    /// Report the resolution and optimal model bin widths of a spo/res pair
    Resolution(commands::ResolutionArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Convert(args) => commands::run_convert_command(args),
        CliCommand::Simulate(args) => commands::run_simulate_command(args),
        CliCommand::Resolution(args) => commands::run_resolution_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Convert(#[from] SpexError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Convert(error) => error.exit_code(),
            Self::Internal(_) => 1,
        }
    }
}
