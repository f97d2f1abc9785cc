//! Transcode command - rewrite a CSV file as UTF-8 with comma delimiters.

use std::fs;
use std::path::PathBuf;

use colored::Colorize;
use statbridge::input::parse_delimiter;
use statbridge::{Detector, Transcoder};

pub fn run(
    file: PathBuf,
    encoding: Option<String>,
    delimiter: Option<String>,
    output: PathBuf,
    _verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let delimiter = match delimiter {
        Some(raw) => Some(
            parse_delimiter(&raw).ok_or_else(|| format!("Invalid delimiter: {:?}", raw))?,
        ),
        None => Some(Detector::new().detect_file(&file)?.delimiter),
    };

    let out_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&out_dir)?;

    let converted = Transcoder::in_dir(&out_dir).transcode(&file, encoding.as_deref(), delimiter)?;
    fs::copy(converted.path(), &output)?;

    println!(
        "{} {} records from {} to {}",
        "Transcoded".green().bold(),
        converted.records.to_string().white().bold(),
        converted.source_encoding.white(),
        output.display().to_string().white()
    );
    if converted.is_degraded() {
        println!(
            "{} decoded via {:?}; some characters may be wrong",
            "Warning:".yellow().bold(),
            converted.step
        );
    }

    Ok(())
}
