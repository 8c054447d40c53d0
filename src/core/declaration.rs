//! Functor declarations.
//!
//! A functor is one registered calculation unit: the capability it
//! provides, the result type, the quantities it depends on (some only
//! under certain active models), the backend functions it requires, its
//! loop profile, and the models it accepts. Declarations are built once at
//! startup and frozen into the registry; the compute closure is the only
//! part that runs per scan point.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::backend::Signature;
use crate::core::capability::{Capability, Quantity, TypeTag};
use crate::engine::{ComputationError, EvalContext};
use crate::util::InternedString;

/// A type-erased cached result value.
pub type Value = Box<dyn Any + Send + Sync>;

/// The computation entry point of a functor.
pub type ComputeFn =
    Arc<dyn Fn(&EvalContext<'_>) -> Result<Value, ComputationError> + Send + Sync>;

/// One static dependency declaration.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    /// Required capability and type.
    pub quantity: Quantity,
    /// Models under which this dependency materializes; empty means
    /// unconditional.
    pub activate_for: Vec<InternedString>,
}

impl DependencySpec {
    /// True when the dependency applies under every model.
    pub fn is_unconditional(&self) -> bool {
        self.activate_for.is_empty()
    }
}

/// One backend requirement declaration.
#[derive(Debug, Clone)]
pub struct BackendReqSpec {
    /// Required symbol name.
    pub symbol: InternedString,
    /// Required call signature.
    pub signature: Signature,
    /// Group this requirement belongs to, if any. Grouped requirements
    /// resolve together: one active backend fixes which member binds.
    pub group: Option<InternedString>,
    /// Backends allowed to satisfy the requirement; empty means any
    /// active backend.
    pub allowed_backends: Vec<InternedString>,
}

/// A declared calculation unit.
pub struct FunctorDecl {
    module: InternedString,
    function: InternedString,
    capability: Capability,
    result: TypeTag,
    dependencies: Vec<DependencySpec>,
    backend_reqs: Vec<BackendReqSpec>,
    /// Managing and being managed compose: an inner loop manager is
    /// itself driven by an outer one.
    can_manage: bool,
    managed_by: Option<Capability>,
    allowed_models: Vec<InternedString>,
    compute: ComputeFn,
}

impl FunctorDecl {
    /// Declare a functor computing `capability` as type `T`.
    pub fn new<T, F>(
        module: impl AsRef<str>,
        function: impl AsRef<str>,
        capability: impl AsRef<str>,
        compute: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&EvalContext<'_>) -> Result<T, ComputationError> + Send + Sync + 'static,
    {
        FunctorDecl {
            module: InternedString::new(module),
            function: InternedString::new(function),
            capability: Capability::new(capability),
            result: TypeTag::of::<T>(),
            dependencies: Vec::new(),
            backend_reqs: Vec::new(),
            can_manage: false,
            managed_by: None,
            allowed_models: Vec::new(),
            compute: Arc::new(move |ctx| compute(ctx).map(|v| Box::new(v) as Value)),
        }
    }

    /// Declare an unconditional dependency on `capability` of type `T`.
    pub fn depends_on<T: 'static>(mut self, capability: impl AsRef<str>) -> Self {
        self.dependencies.push(DependencySpec {
            quantity: Quantity::new::<T>(capability),
            activate_for: Vec::new(),
        });
        self
    }

    /// Declare a dependency that materializes only when the active model
    /// is (or descends from) one of the listed models.
    pub fn depends_on_for_models<T: 'static>(
        mut self,
        capability: impl AsRef<str>,
        models: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        self.dependencies.push(DependencySpec {
            quantity: Quantity::new::<T>(capability),
            activate_for: models.into_iter().map(InternedString::new).collect(),
        });
        self
    }

    /// Declare a plain backend requirement.
    pub fn requires_backend<Args: 'static, Ret: 'static>(
        mut self,
        symbol: impl AsRef<str>,
    ) -> Self {
        self.backend_reqs.push(BackendReqSpec {
            symbol: InternedString::new(symbol),
            signature: Signature::of::<Args, Ret>(),
            group: None,
            allowed_backends: Vec::new(),
        });
        self
    }

    /// Restrict the most recently declared backend requirement to the
    /// named backends.
    pub fn from_backends(mut self, backends: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        if let Some(req) = self.backend_reqs.last_mut() {
            req.allowed_backends
                .extend(backends.into_iter().map(InternedString::new));
        }
        self
    }

    /// Declare a backend requirement belonging to a group.
    pub fn requires_backend_from_group<Args: 'static, Ret: 'static>(
        mut self,
        group: impl AsRef<str>,
        symbol: impl AsRef<str>,
    ) -> Self {
        self.backend_reqs.push(BackendReqSpec {
            symbol: InternedString::new(symbol),
            signature: Signature::of::<Args, Ret>(),
            group: Some(InternedString::new(group)),
            allowed_backends: Vec::new(),
        });
        self
    }

    /// Mark this functor as a loop manager.
    pub fn can_manage_loops(mut self) -> Self {
        self.can_manage = true;
        self
    }

    /// Mark this functor as managed by a provider of the given loop
    /// capability: it runs only inside that manager's loop and is
    /// excluded from the outer schedule. Combines with
    /// [`can_manage_loops`](Self::can_manage_loops) for nested loops.
    pub fn needs_manager_with_capability(mut self, capability: impl AsRef<str>) -> Self {
        self.managed_by = Some(Capability::new(capability));
        self
    }

    /// Restrict this functor to the listed models (and their descendants).
    pub fn allow_models(mut self, models: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.allowed_models
            .extend(models.into_iter().map(InternedString::new));
        self
    }

    /// Owning module name.
    pub fn module(&self) -> InternedString {
        self.module
    }

    /// Function name.
    pub fn function(&self) -> InternedString {
        self.function
    }

    /// Qualified `module::function` identifier.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.function)
    }

    /// Provided capability.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Result type.
    pub fn result(&self) -> TypeTag {
        self.result
    }

    /// Provided quantity: capability plus result type.
    pub fn quantity(&self) -> Quantity {
        Quantity::from_parts(self.capability, self.result)
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    /// Declared backend requirements.
    pub fn backend_reqs(&self) -> &[BackendReqSpec] {
        &self.backend_reqs
    }

    /// True when this functor may manage an inner loop.
    pub fn manages_loops(&self) -> bool {
        self.can_manage
    }

    /// The loop capability whose provider must manage this functor, if
    /// any.
    pub fn managed_by(&self) -> Option<Capability> {
        self.managed_by
    }

    /// Allowed models; empty means unrestricted.
    pub fn allowed_models(&self) -> &[InternedString] {
        &self.allowed_models
    }

    /// The computation entry point.
    pub fn compute(&self) -> &ComputeFn {
        &self.compute
    }

    /// Check whether this functor accepts the given active model,
    /// walking the model's ancestor chain.
    pub fn accepts_model(
        &self,
        models: &crate::core::model::ModelHierarchy,
        active: InternedString,
    ) -> bool {
        self.allowed_models.is_empty()
            || self
                .allowed_models
                .iter()
                .any(|m| models.descends_from(active, *m))
    }
}

// Compute closures are opaque; everything else is shown.
impl fmt::Debug for FunctorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctorDecl")
            .field("module", &self.module)
            .field("function", &self.function)
            .field("capability", &self.capability)
            .field("result", &self.result)
            .field("dependencies", &self.dependencies)
            .field("backend_reqs", &self.backend_reqs)
            .field("can_manage", &self.can_manage)
            .field("managed_by", &self.managed_by)
            .field("allowed_models", &self.allowed_models)
            .finish()
    }
}
