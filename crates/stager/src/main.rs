mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use stager_core::{init_logging, Config};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let mut log = config.log();
    if let Some(level) = &cli.log_level {
        log.level = level.clone();
    }
    let _guard = init_logging(&log)?;

    commands::execute(cli, &config)
}
