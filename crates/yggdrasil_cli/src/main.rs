//! `yggdrasil` command-line entry point.

mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use miette::Result;

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    commands::init_logging(&cli.global)?;

    match cli.command {
        Commands::Migrate(args) => commands::migrate(args, &cli.global),
        Commands::Structure(args) => commands::structure(args, &cli.global),
        Commands::Search(args) => commands::search(args, &cli.global),
    }
}
