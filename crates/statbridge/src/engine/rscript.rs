//! R engine driven through the `Rscript` executable.
//!
//! Each load and each call runs a fresh `Rscript -e` process that sources
//! the analysis script. Results come back as JSON printed after a marker
//! line, so anything the script itself prints is ignored.

use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::provider::{EngineArg, EngineFailure, EngineOutput, EngineValue, StatEngine};
use crate::error::{Result, StatBridgeError};

/// Default R function invoked by the engine.
pub const DEFAULT_FUNCTION: &str = "run_analysis";

const RESULT_MARKER: &str = "__STATBRIDGE_RESULT__";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// `Error in <deparsed call> :` or `Error:` as R prints an uncaught condition.
static R_ERROR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^Error(?: in .*? :|:)\s*").unwrap());

/// Configuration of the Rscript engine.
#[derive(Debug, Clone)]
pub struct RscriptConfig {
    /// The `Rscript` executable.
    pub rscript: String,
    /// The R script defining the analysis function.
    pub script: PathBuf,
    /// Name of the analysis function.
    pub function: String,
    /// Time budget for loading the script.
    pub load_timeout: Duration,
}

impl RscriptConfig {
    /// Config for a script with default settings.
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            rscript: "Rscript".to_string(),
            script: script.into(),
            function: DEFAULT_FUNCTION.to_string(),
            load_timeout: Duration::from_secs(30),
        }
    }

    /// Config from `STATBRIDGE_SCRIPT`, `STATBRIDGE_RSCRIPT` and
    /// `STATBRIDGE_TIMEOUT_SECS`. The script variable is required.
    pub fn from_env() -> Result<Self> {
        let script = env::var("STATBRIDGE_SCRIPT")
            .map_err(|_| StatBridgeError::Config("STATBRIDGE_SCRIPT is not set".to_string()))?;
        Self::new(script).apply_env()
    }

    /// Override the executable and timeout from the environment when set.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(rscript) = env::var("STATBRIDGE_RSCRIPT") {
            if !rscript.trim().is_empty() {
                self.rscript = rscript;
            }
        }
        if let Some(timeout) = timeout_from_env()? {
            self.load_timeout = timeout;
        }
        Ok(self)
    }

    /// Use a different executable.
    pub fn with_rscript(mut self, rscript: impl Into<String>) -> Self {
        self.rscript = rscript.into();
        self
    }

    /// Call a different function.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }
}

/// Timeout from `STATBRIDGE_TIMEOUT_SECS`, if set.
pub fn timeout_from_env() -> Result<Option<Duration>> {
    match env::var("STATBRIDGE_TIMEOUT_SECS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                StatBridgeError::Config(format!("STATBRIDGE_TIMEOUT_SECS is not a number: {}", raw))
            }),
        Err(_) => Ok(None),
    }
}

/// Engine backed by an R script.
#[derive(Debug, Clone)]
pub struct RscriptEngine {
    config: RscriptConfig,
}

impl RscriptEngine {
    /// Create an engine; nothing runs until the first load.
    pub fn new(config: RscriptConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RscriptConfig {
        &self.config
    }

    fn source_line(&self) -> String {
        format!(
            "suppressMessages(source({}, encoding = \"UTF-8\"))",
            r_string(&self.config.script.to_string_lossy())
        )
    }

    fn load_program(&self) -> String {
        let function = &self.config.function;
        format!(
            "{source}\n\
             if (!exists({name}, mode = \"function\")) stop(\"function '{function}' not found in script\")\n\
             cat(\"\\n{marker}\\n\")\n\
             cat(names(formals({function})), sep = \"\\n\")\n",
            source = self.source_line(),
            name = r_string(function),
            function = function,
            marker = RESULT_MARKER,
        )
    }

    fn call_program(&self, args: &[EngineArg]) -> String {
        let rendered: Vec<String> = args.iter().map(r_literal).collect();
        format!(
            "{source}\n\
             res <- tryCatch({function}({args}), error = function(e) {{\n\
               cat(conditionMessage(e), file = stderr())\n\
               quit(save = \"no\", status = 1)\n\
             }})\n\
             cat(\"\\n{marker}\\n\")\n\
             cat(jsonlite::toJSON(res, auto_unbox = TRUE, null = \"null\", na = \"null\", force = TRUE, digits = NA))\n",
            source = self.source_line(),
            function = self.config.function,
            args = rendered.join(", "),
            marker = RESULT_MARKER,
        )
    }

    fn run(&self, program: &str, timeout: Duration) -> std::result::Result<String, EngineFailure> {
        let mut command = Command::new(&self.config.rscript);
        command.arg("-e").arg(program);
        run_with_timeout(command, timeout).map_err(|mut failure| {
            if failure.timed_out_after.is_none() {
                failure.message = r_error_message(&failure.message);
            }
            failure
        })
    }
}

impl StatEngine for RscriptEngine {
    fn name(&self) -> &str {
        "rscript"
    }

    fn source_stamp(&self) -> Option<SystemTime> {
        fs::metadata(&self.config.script)
            .and_then(|m| m.modified())
            .ok()
    }

    fn load(&mut self) -> std::result::Result<Vec<String>, EngineFailure> {
        if !self.config.script.exists() {
            return Err(EngineFailure::new(format!(
                "R script not found: {}",
                self.config.script.display()
            )));
        }
        let stdout = self.run(&self.load_program(), self.config.load_timeout)?;
        let params = after_marker(&stdout)
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        debug!(script = %self.config.script.display(), params = ?params, "introspected R function");
        Ok(params)
    }

    fn call(
        &mut self,
        args: &[EngineArg],
        timeout: Duration,
    ) -> std::result::Result<EngineOutput, EngineFailure> {
        let stdout = self.run(&self.call_program(args), timeout)?;
        Ok(EngineOutput::Value(parse_result(&stdout)))
    }
}

/// Render an argument as an R literal.
///
/// Columns go by 1-based position when known, else by header name.
pub fn r_literal(arg: &EngineArg) -> String {
    match arg {
        EngineArg::Str(s) => r_string(s),
        EngineArg::Int(i) => format!("{}L", i),
        EngineArg::Column(column) => match column.position {
            Some(position) => format!("{}L", position),
            None => r_string(&column.name),
        },
        EngineArg::Null => "NULL".to_string(),
    }
}

fn r_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// The condition message of an R error report.
///
/// Drops the `Error in <call> :` prefix, whose echoed arguments would
/// otherwise leak into failure classification, and the trailing
/// `Execution halted` line.
pub fn r_error_message(stderr: &str) -> String {
    let body: Vec<&str> = stderr
        .lines()
        .filter(|line| line.trim() != "Execution halted")
        .collect();
    let body = body.join("\n");
    let body = body.trim();
    let message = R_ERROR_PREFIX.replace(body, "");
    let message = message.trim();
    if message.is_empty() {
        body.to_string()
    } else {
        message.to_string()
    }
}

fn after_marker(stdout: &str) -> Option<&str> {
    stdout
        .rfind(RESULT_MARKER)
        .map(|i| &stdout[i + RESULT_MARKER.len()..])
}

/// Interpret a call's standard output.
///
/// JSON after the marker becomes a structured value; anything else is
/// kept as an opaque string.
pub fn parse_result(stdout: &str) -> EngineValue {
    let payload = after_marker(stdout).unwrap_or(stdout).trim();
    match serde_json::from_str(payload) {
        Ok(json) => EngineValue::from_json(json),
        Err(_) => EngineValue::Opaque(payload.to_string()),
    }
}

/// Run a command, killing it when it exceeds `timeout`.
///
/// Returns standard output on success; a non-zero exit becomes a failure
/// carrying standard error.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> std::result::Result<String, EngineFailure> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineFailure::new(format!("failed to start {}: {}", program, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || drain(stdout));
    let err_reader = thread::spawn(move || drain(stderr));

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineFailure::timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineFailure::new(format!("waiting for {}: {}", program, e)));
            }
        }
    };

    let stdout = out_reader.join().unwrap_or_default();
    let stderr = err_reader.join().unwrap_or_default();

    if status.success() {
        Ok(stdout)
    } else {
        let message = stderr.trim();
        Err(EngineFailure::new(if message.is_empty() {
            format!("{} exited with {}", program, status)
        } else {
            message.to_string()
        }))
    }
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut bytes);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
