//! Core data model: capabilities, functor declarations, the registry,
//! backend function tables, and the model hierarchy.

pub mod backend;
pub mod capability;
pub mod declaration;
pub mod model;
pub mod registry;

pub use backend::{BackendEntry, BackendFn, Signature};
pub use capability::{Capability, Quantity, TypeTag};
pub use declaration::{BackendReqSpec, DependencySpec, FunctorDecl, Value};
pub use model::{ModelDescriptor, ModelHierarchy, ParameterPoint};
pub use registry::{BackendFnId, FunctorId, Registry, RegistryBuilder, RegistryError};
