//! pce - rootless container engine CLI
//!
//! `run` and `download` use a tokio runtime. The hidden `internalrun`
//! subcommand is the inner phase of `run` and stays single-threaded.

use std::future::Future;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => block_on(commands::run::execute(args, cli.verbose)),
        Commands::Download(args) => block_on(commands::download::execute(args)),
        Commands::InternalRun(args) => commands::internal::execute(args, cli.verbose),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn block_on<F>(future: F) -> Result<i32>
where
    F: Future<Output = Result<i32>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(future)
}
