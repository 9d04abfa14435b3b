mod cli;
mod commands;
mod config;
mod logging;
mod worker;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command};
use crate::config::load_config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose || logging::env_flag());
    let config = load_config(cli.config.as_deref())?;
    let options = config.reconstruct_options(cli.skip_unreadable);

    match cli.command {
        Command::Sources { inputs } => {
            commands::sources(&inputs, &mut io::stdout().lock())?;
        }
        Command::Plans { inputs } => {
            commands::plans(&inputs, options, &mut io::stdout().lock())?;
        }
        Command::Entries {
            inputs,
            plan,
            date,
            out,
        } => {
            commands::entries(&inputs, options, &plan, &date, out.as_deref())?;
        }
        Command::Summary { inputs, plan, date } => {
            let days = commands::summary(
                &inputs,
                options,
                &config.qa,
                &plan,
                date.as_deref(),
                &mut io::stdout().lock(),
            )?;
            info!(plan = %plan, days, "summarised plan");
        }
        Command::Dump { inputs, out } => {
            commands::dump(&inputs, options, &out)?;
        }
    }
    Ok(())
}
