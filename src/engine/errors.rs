//! Evaluation-time error taxonomy.
//!
//! `ComputationError` is what user compute closures return; the engine
//! maps it onto `EvalError`, which is what callers of the engine see.

use thiserror::Error;

/// Error raised inside a functor's compute closure.
#[derive(Debug, Error)]
pub enum ComputationError {
    #[error("{0}")]
    Invalid(String),

    #[error("no dependency slot bound for capability `{capability}`")]
    UnknownDependency { capability: String },

    #[error("dependency `{capability}` has not been evaluated for this point")]
    DependencyStale { capability: String },

    #[error("dependency `{capability}` holds a value of a different type")]
    DependencyType { capability: String },

    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },

    #[error("backend requirement `{symbol}` is not bound")]
    BackendUnresolved { symbol: String },

    #[error("backend requirement `{symbol}` bound with a different signature")]
    BackendSignature { symbol: String },

    #[error(transparent)]
    Nested(Box<EvalError>),
}

impl ComputationError {
    /// A domain failure described by the compute closure itself.
    pub fn invalid(message: impl Into<String>) -> Self {
        ComputationError::Invalid(message.into())
    }
}

/// Error during point evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("`{functor}` evaluated before its dependency `{dependency}`")]
    DependencyNotReady { functor: String, dependency: String },

    #[error("`{functor}` ran with backend requirement `{symbol}` unbound")]
    BackendUnresolved { functor: String, symbol: String },

    #[error("`{functor}` failed to compute")]
    ComputationFailure {
        functor: String,
        #[source]
        source: ComputationError,
    },

    #[error("no result available for `{quantity}`")]
    ResultUnavailable { quantity: String },
}
