//! moca-config - inspect and edit MocaConfig files from the shell.

use std::{error::Error, process};

use clap::Parser;
use moca_config::{
    cli::{Cli, CliService, Commands, formatting::format_error},
    tracing_config,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_config::init(cli.log_level())?;
    tracing::debug!(file = %cli.file.display(), "Starting moca-config");

    let service = CliService::new(&cli);

    let result = match &cli.command {
        Commands::Watch { pattern } => service.watch(pattern).await,
        command => service.execute(command),
    };

    service.shutdown();

    match result {
        Ok(output) => {
            if !output.trim().is_empty() {
                println!("{output}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string()));
            process::exit(1);
        }
    }
}
