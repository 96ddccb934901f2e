//! TaskMaster CLI - AI task breakdown and prioritisation from the command line
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser as _;
use cli::Cli;

mod cli;
mod handlers;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    handlers::init_tracing();

    handlers::run(cli).await
}
