//! Scripted engine for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use super::provider::{EngineArg, EngineFailure, EngineOutput, EngineValue, StatEngine};

type Responder = Box<dyn FnMut(&[EngineArg]) -> Result<EngineOutput, EngineFailure> + Send>;

/// Parameters the mock declares unless told otherwise.
pub const MOCK_PARAMS: &[&str] = &["csv_path", "x", "y", "plots_dir", "encoding", "delimiter"];

/// Calls received by a [`MockEngine`], shared with the test that built it.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Vec<EngineArg>>>>);

impl CallLog {
    fn record(&self, args: &[EngineArg]) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(args.to_vec());
        }
    }

    /// Every call's arguments, oldest first.
    pub fn calls(&self) -> Vec<Vec<EngineArg>> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls received.
    pub fn len(&self) -> usize {
        self.0.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether no call was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The string argument at `index` of every call.
    pub fn str_args(&self, index: usize) -> Vec<Option<String>> {
        self.calls()
            .iter()
            .map(|args| args.get(index).and_then(|a| a.as_str()).map(str::to_string))
            .collect()
    }
}

/// Shared, adjustable source stamp of a [`MockEngine`].
#[derive(Debug, Clone)]
pub struct StampHandle(Arc<Mutex<Option<SystemTime>>>);

impl StampHandle {
    /// Move the stamp forward, as if the source had been edited.
    pub fn touch(&self) {
        if let Ok(mut stamp) = self.0.lock() {
            let base = stamp.unwrap_or(SystemTime::UNIX_EPOCH);
            *stamp = Some(base + Duration::from_secs(1));
        }
    }

    /// Drop the stamp entirely.
    pub fn clear(&self) {
        if let Ok(mut stamp) = self.0.lock() {
            *stamp = None;
        }
    }

    fn get(&self) -> Option<SystemTime> {
        self.0.lock().ok().and_then(|s| *s)
    }
}

/// Engine that answers with a scripted responder and records its calls.
pub struct MockEngine {
    params: Vec<String>,
    responder: Responder,
    calls: CallLog,
    loads: Arc<AtomicUsize>,
    stamp: StampHandle,
    load_error: Option<String>,
}

impl MockEngine {
    /// Mock that declares [`MOCK_PARAMS`] and always succeeds.
    pub fn new() -> Self {
        Self {
            params: MOCK_PARAMS.iter().map(|p| p.to_string()).collect(),
            responder: Box::new(|_| Ok(EngineOutput::Value(Self::sample_result()))),
            calls: CallLog::default(),
            loads: Arc::new(AtomicUsize::new(0)),
            stamp: StampHandle(Arc::new(Mutex::new(Some(SystemTime::UNIX_EPOCH)))),
            load_error: None,
        }
    }

    /// Declare a different parameter list.
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Answer calls with `responder`.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&[EngineArg]) -> Result<EngineOutput, EngineFailure> + Send + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Make every load fail with `message`.
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.load_error = Some(message.into());
        self
    }

    /// Handle on the calls this mock will receive.
    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    /// Counter of loads this mock will perform.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    /// Handle on this mock's source stamp.
    pub fn stamp_handle(&self) -> StampHandle {
        self.stamp.clone()
    }

    /// The result the default responder returns.
    pub fn sample_result() -> EngineValue {
        EngineValue::named([
            ("recommended_test", EngineValue::Str("t_student".into())),
            (
                "stats",
                EngineValue::named([
                    ("statistic", EngineValue::Float(2.31)),
                    ("p_value", EngineValue::Float(0.027)),
                ]),
            ),
            ("plot_path", EngineValue::Str("[1] \"plot_t_student.png\"".into())),
        ])
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn source_stamp(&self) -> Option<SystemTime> {
        self.stamp.get()
    }

    fn load(&mut self) -> Result<Vec<String>, EngineFailure> {
        if let Some(message) = &self.load_error {
            return Err(EngineFailure::new(message.clone()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.params.clone())
    }

    fn call(
        &mut self,
        args: &[EngineArg],
        _timeout: Duration,
    ) -> Result<EngineOutput, EngineFailure> {
        self.calls.record(args);
        (self.responder)(args)
    }
}
