//! StatBridge CLI - CSV ingestion and statistics engine bridge.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "statbridge=debug" } else { "statbridge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Inspect { file, json } => commands::inspect::run(file, json, cli.verbose),

        Commands::Upload { file, store, json } => {
            commands::upload::run(file, store, json, cli.verbose)
        }

        Commands::Columns { id, store, json } => {
            commands::columns::run(id, store, json, cli.verbose)
        }

        Commands::Analyze {
            id,
            x,
            y,
            store,
            script,
            rscript,
            timeout,
            plots_dir,
            mock,
            json,
        } => commands::analyze::run(
            commands::analyze::AnalyzeArgs {
                id,
                x,
                y,
                store,
                script,
                rscript,
                timeout,
                plots_dir,
                mock,
                json,
            },
            cli.verbose,
        ),

        Commands::Transcode {
            file,
            encoding,
            delimiter,
            output,
        } => commands::transcode::run(file, encoding, delimiter, output, cli.verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
