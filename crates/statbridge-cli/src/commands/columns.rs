//! Columns command - list the columns of a stored dataset.

use std::path::PathBuf;

use colored::Colorize;
use statbridge::{MockEngine, PipelineConfig, StatBridge};

pub fn run(
    id: String,
    store: PathBuf,
    json_output: bool,
    _verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = StatBridge::new(PipelineConfig::new(&store), MockEngine::new())?;
    let catalog = bridge.columns(&id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("{} {}", "Columns of".cyan().bold(), id.white());
    println!();
    super::print_catalog(&catalog);

    Ok(())
}
