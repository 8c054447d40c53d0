//! User-friendly diagnostic messages.
//!
//! Every resolution failure must name the root cause, the chain of
//! capabilities that demanded the failing quantity, and a suggested fix.
//! Mis-configured graphs are fatal; the point of a diagnostic is to make
//! the configuration fix obvious.

use std::fmt;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// Common suggestion messages for consistent error reporting.
pub mod suggestions {
    /// Suggestion when several providers compete for one capability.
    pub const PIN_PROVIDER: &str =
        "help: Pin one provider in the [rules.providers] table of the scan config";

    /// Suggestion when no provider exists for a demanded quantity.
    pub const CHECK_REGISTRATION: &str =
        "help: Check that the providing module was registered before resolution";

    /// Suggestion when model filtering removed every provider.
    pub const CHECK_MODEL: &str =
        "help: Check the active model against the provider's allowed models";

    /// Suggestion when several backends satisfy one requirement.
    pub const PIN_BACKEND: &str =
        "help: Pin one backend in the [rules.backends] table of the scan config";

    /// Suggestion when no active backend exports a required symbol.
    pub const ACTIVATE_BACKEND: &str =
        "help: Add the providing backend to `request.backends` in the scan config";

    /// Suggestion for dependency cycles.
    pub const BREAK_CYCLE: &str =
        "help: Break the cycle by removing a dependency or routing it through a loop manager";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional context and suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
                Severity::Help => "\x1b[1;32mhelp\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Ambiguous provider error with rich reporting for the CLI edge.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("ambiguous providers for `{quantity}`")]
#[diagnostic(
    code(capstan::resolve::ambiguous_provider),
    help("Pin one provider in [rules.providers], e.g. `\"{quantity}\" = \"module::function\"`")
)]
pub struct AmbiguousProviderReport {
    pub quantity: String,
    pub candidates: Vec<String>,
}

/// Missing provider error.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("no provider found for `{quantity}`")]
#[diagnostic(code(capstan::resolve::no_provider))]
pub struct NoProviderReport {
    pub quantity: String,
    #[help]
    pub required_by: Option<String>,
}

/// Unbound backend requirement error.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("backend requirement `{symbol}` cannot be satisfied")]
#[diagnostic(
    code(capstan::resolve::backend_unresolved),
    help("Activate a backend exporting `{symbol}` with a matching signature")
)]
pub struct BackendUnresolvedReport {
    pub symbol: String,
    pub active_backends: Vec<String>,
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
