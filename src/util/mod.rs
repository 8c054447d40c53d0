//! Shared utilities: interning, diagnostics, configuration.

pub mod config;
pub mod diagnostic;
pub mod interning;

pub use interning::InternedString;
