#![warn(missing_docs)]

//! Entry point for the `ctxkey` binary.

mod cli;
mod commands;
mod error;

use std::{io, process};

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, registry};

use crate::{
    cli::{Cli, Commands},
    error::Result,
};

fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
fn run() -> Result<()> {
    let Cli { log, command } = Cli::parse();
    registry()
        .with(log.env_filter())
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .try_init()
        .ok();

    let mut out = io::stdout().lock();
    match command {
        Commands::Eval(args) => commands::eval(&args, &mut out),
        Commands::Normalize(args) => commands::normalize(&args, &mut out),
        Commands::Keys(args) => commands::keys(&args, &mut out),
    }
}
