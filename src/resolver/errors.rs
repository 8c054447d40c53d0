//! Resolution error taxonomy and diagnostics.
//!
//! Every resolution-time error is fatal to the run and carries the chain
//! of capability names that led to the failure.

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error during dependency resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no provider found for `{quantity}`")]
    NoProvider {
        quantity: String,
        /// Capability chain from the request down to the failure.
        chain: Vec<String>,
        model: String,
        /// A pin that matched no registered provider, if one was given.
        pinned_to: Option<String>,
    },

    #[error("ambiguous providers for `{quantity}`")]
    AmbiguousProvider {
        quantity: String,
        candidates: Vec<String>,
        chain: Vec<String>,
    },

    #[error("cyclic dependency involving `{quantity}`")]
    CyclicDependency {
        quantity: String,
        cycle: Vec<String>,
    },

    #[error("no unique loop manager for `{functor}`")]
    NoUniqueLoopManager {
        functor: String,
        loop_capability: String,
        candidates: Vec<String>,
        chain: Vec<String>,
    },

    #[error("backend requirement `{requirement}` of `{functor}` cannot be satisfied")]
    BackendUnresolved {
        functor: String,
        /// Symbol name, or group name for grouped requirements.
        requirement: String,
        active_backends: Vec<String>,
        chain: Vec<String>,
    },

    #[error("ambiguous backends for requirement `{requirement}` of `{functor}`")]
    AmbiguousBackend {
        functor: String,
        requirement: String,
        candidates: Vec<String>,
        chain: Vec<String>,
    },

    #[error("unknown active model `{model}`")]
    UnknownModel { model: String },
}

impl ResolveError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::NoProvider {
                quantity,
                chain,
                model,
                pinned_to,
            } => {
                let mut diag =
                    Diagnostic::error(format!("no provider found for `{}`", quantity));
                diag = diag.with_context(format!("active model: {}", model));
                if let Some(pin) = pinned_to {
                    diag = diag.with_context(format!(
                        "pinned to `{}`, which matches no registered provider",
                        pin
                    ));
                }
                diag = with_chain(diag, chain);
                diag.with_suggestion(suggestions::CHECK_REGISTRATION)
                    .with_suggestion(suggestions::CHECK_MODEL)
            }

            ResolveError::AmbiguousProvider {
                quantity,
                candidates,
                chain,
            } => {
                let mut diag =
                    Diagnostic::error(format!("ambiguous providers for `{}`", quantity));
                for candidate in candidates {
                    diag = diag.with_context(format!("candidate: {}", candidate));
                }
                diag = with_chain(diag, chain);
                diag.with_suggestion(suggestions::PIN_PROVIDER)
            }

            ResolveError::CyclicDependency { quantity, cycle } => {
                Diagnostic::error(format!("cyclic dependency involving `{}`", quantity))
                    .with_context(format!("cycle: {}", cycle.join(" -> ")))
                    .with_suggestion(suggestions::BREAK_CYCLE)
            }

            ResolveError::NoUniqueLoopManager {
                functor,
                loop_capability,
                candidates,
                chain,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "no unique loop manager for `{}` (loop capability `{}`)",
                    functor, loop_capability
                ));
                if candidates.is_empty() {
                    diag = diag.with_context("no eligible manager is registered");
                } else {
                    for candidate in candidates {
                        diag = diag.with_context(format!("candidate manager: {}", candidate));
                    }
                }
                diag = with_chain(diag, chain);
                diag.with_suggestion(suggestions::PIN_PROVIDER)
            }

            ResolveError::BackendUnresolved {
                functor,
                requirement,
                active_backends,
                chain,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "backend requirement `{}` of `{}` cannot be satisfied",
                    requirement, functor
                ));
                if active_backends.is_empty() {
                    diag = diag.with_context("no backends are active");
                } else {
                    diag = diag.with_context(format!(
                        "active backends: {}",
                        active_backends.join(", ")
                    ));
                }
                diag = with_chain(diag, chain);
                diag.with_suggestion(suggestions::ACTIVATE_BACKEND)
            }

            ResolveError::AmbiguousBackend {
                functor,
                requirement,
                candidates,
                chain,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "ambiguous backends for requirement `{}` of `{}`",
                    requirement, functor
                ));
                for candidate in candidates {
                    diag = diag.with_context(format!("candidate: {}", candidate));
                }
                diag = with_chain(diag, chain);
                diag.with_suggestion(suggestions::PIN_BACKEND)
            }

            ResolveError::UnknownModel { model } => {
                Diagnostic::error(format!("unknown active model `{}`", model))
                    .with_suggestion("help: Check the `request.model` entry of the scan config")
            }
        }
    }
}

fn with_chain(mut diag: Diagnostic, chain: &[String]) -> Diagnostic {
    if !chain.is_empty() {
        diag = diag.with_context(format!("required by: {}", chain.join(" <- ")));
    }
    diag
}
