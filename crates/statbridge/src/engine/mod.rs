//! The statistics engine seam.
//!
//! [`StatEngine`] is the contract an external engine fulfils. An
//! [`EngineSession`] owns one engine with its loaded state and cached
//! [`EngineCallSpec`]. Failures are sorted by [`classify_failure`] and
//! results are flattened by [`normalize_output`].

mod failure;
mod mock;
mod normalize;
mod provider;
mod rscript;
mod session;

pub use failure::{classify_failure, FailureKind};
pub use mock::{CallLog, MockEngine, StampHandle, MOCK_PARAMS};
pub use normalize::{clean_printed, clean_text, normalize_output, to_json, AnalysisResult};
pub use provider::{EngineArg, EngineFailure, EngineOutput, EngineValue, ResultHandle, StatEngine};
pub use rscript::{
    parse_result, r_literal, run_with_timeout, timeout_from_env, RscriptConfig, RscriptEngine,
    DEFAULT_FUNCTION,
};
pub use session::{CallArgs, EngineCallSpec, EngineSession, DELIMITER_PARAM, ENCODING_PARAM};
