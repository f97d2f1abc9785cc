//! Inspect command - detect dialect and catalog columns without storing.

use std::path::PathBuf;

use colored::Colorize;
use statbridge::inference::count_rows;
use statbridge::{CatalogBuilder, Detector};

pub fn run(file: PathBuf, json_output: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let detection = Detector::new().detect_file(&file)?;
    let catalog =
        CatalogBuilder::new().build(&file, detection.encoding.as_deref(), detection.delimiter)?;
    let rows = count_rows(&file, &catalog.used_encoding, detection.delimiter);

    if json_output {
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "detected_encoding": detection.encoding,
            "delimiter": (detection.delimiter as char).to_string(),
            "rows": rows,
            "catalog": catalog,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "Inspecting".cyan().bold(),
        file.display().to_string().white()
    );
    if verbose {
        println!(
            "Detector guess: {}",
            detection.encoding.as_deref().unwrap_or("none").dimmed()
        );
    }
    println!();
    super::print_catalog(&catalog);

    println!();
    match rows {
        Some(n) => println!("{} data rows", n.to_string().white().bold()),
        None => println!("{}", "Row count unavailable".yellow()),
    }

    Ok(())
}
