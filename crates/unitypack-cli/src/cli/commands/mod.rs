use super::args::*;

pub(crate) mod create;
pub(crate) mod inspect;
pub(crate) mod pack_folder;

use crate::exit_codes;
use std::sync::Arc;
use unitypack_core::{LogSink, PackError, PackageReport};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Create(args) => create::run(args).await,
        Command::PackFolder(args) => pack_folder::run(args).await,
        Command::Inspect(args) => inspect::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Sink echoing pipeline lines to stderr, when asked for.
pub(crate) fn stderr_sink(verbose: bool) -> Option<LogSink> {
    if verbose {
        Some(Arc::new(|line: &str| eprintln!("{}", line)))
    } else {
        None
    }
}

pub(crate) fn exit_code_for(err: &PackError) -> i32 {
    err.exit_code()
}

/// Print the outcome of a build and turn it into an exit code.
pub(crate) fn finish(result: Result<PackageReport, PackError>) -> i32 {
    match result {
        Ok(report) => {
            for err in &report.cleanup_errors {
                eprintln!("warning: {}", err);
            }
            if report.assets.is_empty() {
                eprintln!("package written: {}", report.output.display());
            } else {
                eprintln!(
                    "package written: {} ({} assets)",
                    report.output.display(),
                    report.assets.len()
                );
            }
            exit_codes::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err);
            exit_code_for(&err)
        }
    }
}
