#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Binary entrypoint for the hotfolder dispatcher.

use std::process::ExitCode;

use clap::Parser;
use hotfolder_app::{Cli, run_app};

/// Runs the dispatcher until it is stopped and maps failures to exit codes.
#[tokio::main]
async fn main() -> ExitCode {
    match run_app(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.chain());
            ExitCode::from(err.exit_code())
        }
    }
}
