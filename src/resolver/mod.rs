//! Capability resolution and execution-graph construction.
//!
//! Turns a frozen [`Registry`](crate::core::Registry) plus a requested
//! quantity into an immutable [`ResolvedGraph`]: one provider per
//! demanded quantity, loop managers bound to their managed functors,
//! backend requirements bound to concrete backend functions, and a
//! deterministic evaluation schedule.

pub mod backends;
pub mod errors;
pub mod graph;
pub mod loops;
pub mod resolve;

pub use errors::ResolveError;
pub use graph::{BackendBinding, ResolvedGraph};
pub use resolve::{Resolver, Rules};
