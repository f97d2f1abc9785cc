//! Analyze command - run the statistics engine on two columns.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use statbridge::engine::timeout_from_env;
use statbridge::{
    AnalysisReport, BridgeConfig, MockEngine, PipelineConfig, RscriptConfig, RscriptEngine,
    StatBridge, StatEngine,
};
use tracing::debug;

/// Arguments of the analyze command.
pub struct AnalyzeArgs {
    pub id: String,
    pub x: String,
    pub y: String,
    pub store: PathBuf,
    pub script: Option<PathBuf>,
    pub rscript: Option<String>,
    pub timeout: Option<u64>,
    pub plots_dir: Option<PathBuf>,
    pub mock: bool,
    pub json: bool,
}

pub fn run(args: AnalyzeArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = match args.timeout {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => timeout_from_env()?,
    };
    let mut bridge_config = BridgeConfig::default();
    if let Some(timeout) = timeout {
        bridge_config = bridge_config.with_call_timeout(timeout);
    }
    let config = PipelineConfig::new(&args.store).with_bridge(bridge_config);

    let report = if args.mock {
        analyze_with_engine(config, MockEngine::new(), &args)?
    } else {
        let mut rscript = match args.script {
            Some(ref script) => RscriptConfig::new(script).apply_env()?,
            None => RscriptConfig::from_env()?,
        };
        if let Some(ref exe) = args.rscript {
            rscript = rscript.with_rscript(exe);
        }
        analyze_with_engine(config, RscriptEngine::new(rscript), &args)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report, verbose);
    Ok(())
}

fn analyze_with_engine(
    config: PipelineConfig,
    engine: impl StatEngine + 'static,
    args: &AnalyzeArgs,
) -> Result<AnalysisReport, Box<dyn std::error::Error>> {
    let engine_name = engine.name().to_string();
    debug!(engine = %engine_name, store = %args.store.display(), "opening pipeline");
    let bridge = StatBridge::new(config, engine)?;

    // stdout carries only the report in JSON mode
    if let Some(line) = banner(args, &engine_name) {
        println!("{}", line);
    }

    Ok(bridge.analyze_with(&args.id, &args.x, &args.y, args.plots_dir.as_deref())?)
}

fn banner(args: &AnalyzeArgs, engine_name: &str) -> Option<String> {
    if args.json {
        return None;
    }
    Some(format!(
        "{} {} / {} with {}",
        "Analyzing".cyan().bold(),
        args.x.white(),
        args.y.white(),
        engine_name.white()
    ))
}

fn print_report(report: &AnalysisReport, verbose: bool) {
    println!(
        "Columns: {} (#{}) / {} (#{})",
        report.actual_x.white().bold(),
        position(report.actual_x_index),
        report.actual_y.white().bold(),
        position(report.actual_y_index)
    );
    println!();

    let test = if report.result.recommended_test.is_empty() {
        "none".dimmed()
    } else {
        report.result.recommended_test.green().bold()
    };
    println!("{} {}", "Recommended test:".yellow().bold(), test);

    println!("{}", "Statistics:".yellow().bold());
    match report.result.stats.as_object() {
        Some(stats) if !stats.is_empty() => {
            for (key, value) in stats {
                println!("  {:20} {}", key, value);
            }
        }
        Some(_) => println!("  {}", "(none)".dimmed()),
        None => println!("  {}", report.result.stats),
    }

    if let Some(plot) = report.plot_file(&report.plots_dir) {
        println!("{} {}", "Plot:".yellow().bold(), plot.display());
    }

    println!();
    println!(
        "Engine encoding: {}  Delimiter: {}",
        report.used_encoding.white(),
        format!("{:?}", report.used_delimiter).white()
    );
    if let Some(ref from) = report.transcoded_from {
        let note = if report.transcode_degraded {
            " (lossy)".red().to_string()
        } else {
            String::new()
        };
        println!("Transcoded from {}{}", from.white(), note);
    }

    if !report.failed_attempts.is_empty() {
        println!(
            "{} {} failed attempt(s)",
            "Retried:".yellow(),
            report.failed_attempts.len()
        );
        if verbose {
            for attempt in &report.failed_attempts {
                println!(
                    "  {:12} {:?}: {}",
                    attempt.encoding,
                    attempt.kind,
                    attempt.message.dimmed()
                );
            }
        }
    }
}

fn position(index: Option<usize>) -> String {
    index.map_or_else(|| "?".to_string(), |i| i.to_string())
}
