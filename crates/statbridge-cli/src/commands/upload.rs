//! Upload command - store a CSV file with its detected dialect.

use std::path::PathBuf;

use colored::Colorize;
use statbridge::{MockEngine, PipelineConfig, StatBridge};

pub fn run(
    file: PathBuf,
    store: PathBuf,
    json_output: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    // Uploading never calls the engine
    let bridge = StatBridge::new(PipelineConfig::new(&store), MockEngine::new())?;
    let report = bridge.upload(&file)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let metadata = &report.dataset.metadata;
    println!(
        "{} {} as {}",
        "Uploaded".green().bold(),
        metadata.filename.white(),
        metadata.file_id.cyan().bold()
    );
    println!(
        "  Encoding:  {}",
        metadata.encoding.as_deref().unwrap_or("unknown").white()
    );
    println!(
        "  Delimiter: {}",
        format!("{:?}", metadata.delimiter.as_deref().unwrap_or(",")).white()
    );
    println!("  Columns:   {}", report.catalog.column_count().to_string().white());
    if let Some(rows) = report.row_count {
        println!("  Rows:      {}", rows.to_string().white());
    }

    if verbose {
        if let Some(ref digest) = metadata.sha256 {
            println!("  SHA-256:   {}", digest.dimmed());
        }
        println!();
        super::print_catalog(&report.catalog);
    }

    println!();
    println!(
        "Next: {}",
        format!("statbridge analyze {} <X> <Y> --store {}", metadata.file_id, store.display())
            .cyan()
    );

    Ok(())
}
