//! Error types for the script engine and bridge.

use thiserror::Error;

use rivet_reflect::ReflectError;

/// Errors surfaced by the script engine and the host call protocol.
///
/// Nothing in the bridge unwinds: every failure is recovered at the
/// boundary and reported through this type plus a log line.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Source failed to tokenize or parse
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based source line
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Script evaluation failed
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Call target did not resolve
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Namespace path did not resolve
    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),

    /// Registration attempted after the engine went live
    #[error("registration is closed once the engine is live")]
    RegistrationClosed,

    /// Rejected registration name
    #[error("invalid function name '{0}'")]
    InvalidName(String),

    /// `begin_call` while a call is still unexecuted
    #[error("a call is already in progress")]
    CallInProgress,

    /// Protocol operation without an active call
    #[error("no active call")]
    NoActiveCall,

    /// `get_return` before `end_call`
    #[error("call has not been executed")]
    CallNotExecuted,

    /// Argument push past the configured limit
    #[error("too many call arguments (limit {0})")]
    TooManyArguments(usize),

    /// Error bubbled up from the reflection core
    #[error(transparent)]
    Reflect(#[from] ReflectError),
}
