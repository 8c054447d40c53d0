//! Capstan - a capability-based dependency resolver and execution engine
//! for global physics scans
//!
//! This crate provides the core library functionality for Capstan:
//! functor and backend registration, model hierarchies, dependency
//! resolution into a deterministic execution graph, and per-point
//! evaluation over that graph.

pub mod core;
pub mod engine;
pub mod modules;
pub mod resolver;
pub mod util;

pub use crate::core::{
    BackendEntry, BackendFn, Capability, FunctorDecl, ModelDescriptor, ModelHierarchy,
    ParameterPoint, Quantity, Registry, RegistryBuilder,
};

pub use engine::{evaluate_points, ComputationError, EvalContext, EvalError, Session};
pub use resolver::{ResolveError, ResolvedGraph, Resolver, Rules};
pub use util::InternedString;
