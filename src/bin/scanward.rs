// src/bin/scanward.rs
use std::process;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use scanward_core::cli::handlers;
use scanward_core::cli::{Cli, Commands};
use scanward_core::error::ScanwardError;
use scanward_core::exit::ScanwardExit;

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            exit_for(&e).exit();
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    Ok(dispatch(&cli)?)
}

fn dispatch(cli: &Cli) -> scanward_core::error::Result<i32> {
    match &cli.command {
        Commands::Capture { capture, build } => {
            handlers::handle_capture(capture, build, cli.verbose)
        }
        Commands::Analyze { analyzer, cdb } => {
            handlers::handle_analyze(analyzer, cdb, cli.verbose)
        }
        Commands::Scan {
            capture,
            analyzer,
            build,
        } => handlers::handle_scan(capture, analyzer, build, cli.verbose),
    }
}

/// Unparsable input exits in its own code band so automation can tell
/// "bad compilation database" from "the run blew up", and a build
/// interrupted at the keyboard exits like one.
fn exit_for(error: &anyhow::Error) -> ScanwardExit {
    match error.downcast_ref::<ScanwardError>() {
        Some(ScanwardError::CompilationDb(_)) => ScanwardExit::InvalidInput,
        Some(ScanwardError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::Interrupted =>
        {
            ScanwardExit::Interrupted
        }
        Some(_) => ScanwardExit::Error,
        None => ScanwardExit::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(error: ScanwardError) -> ScanwardExit {
        exit_for(&anyhow::Error::from(error))
    }

    #[test]
    fn errors_map_to_their_exit_bands() {
        assert_eq!(
            band(ScanwardError::CompilationDb("bad json".into())),
            ScanwardExit::InvalidInput
        );
        assert_eq!(
            band(ScanwardError::io(
                std::io::Error::from(std::io::ErrorKind::Interrupted),
                "/build"
            )),
            ScanwardExit::Interrupted
        );
        assert_eq!(
            band(ScanwardError::Compiler("boom".into())),
            ScanwardExit::Error
        );
        assert_eq!(
            exit_for(&anyhow::anyhow!("unclassified")),
            ScanwardExit::Internal
        );
    }
}
