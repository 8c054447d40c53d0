//! Dependency resolution.
//!
//! The resolver is pure and deterministic: given a frozen registry, the
//! model hierarchy, the active model and backend set, and the user's
//! rules, it expands the requested quantity depth-first, selects exactly
//! one provider per demanded quantity, binds loop managers and backend
//! requirements, and produces an immutable `ResolvedGraph`. All failures
//! here are fatal to the run and carry the capability chain that led to
//! them.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::{Capability, FunctorId, ModelHierarchy, Quantity, Registry};
use crate::resolver::backends::bind_backends;
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::ResolvedGraph;
use crate::resolver::loops::manager_candidates;
use crate::util::InternedString;

/// User overrides pinning providers and backends.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    providers: HashMap<Capability, InternedString>,
    backends: HashMap<InternedString, InternedString>,
}

impl Rules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Rules::default()
    }

    /// Pin a capability to one provider, named as `function` or
    /// `module::function`.
    pub fn pin_provider(&mut self, capability: impl AsRef<str>, function: impl AsRef<str>) {
        self.providers
            .insert(Capability::new(capability), InternedString::new(function));
    }

    /// Pin a backend requirement (symbol or group name) to one backend.
    pub fn pin_backend(&mut self, requirement: impl AsRef<str>, backend: impl AsRef<str>) {
        self.backends
            .insert(InternedString::new(requirement), InternedString::new(backend));
    }

    /// The provider pin for a capability, if any.
    pub fn provider_pin(&self, capability: Capability) -> Option<InternedString> {
        self.providers.get(&capability).copied()
    }

    /// The backend pin for a requirement or group name, if any.
    pub fn backend_pin(&self, requirement: InternedString) -> Option<InternedString> {
        self.backends.get(&requirement).copied()
    }

    /// Check whether a declaration matches a provider pin.
    pub fn matches_pin(&self, decl: &crate::core::FunctorDecl, pin: InternedString) -> bool {
        decl.function() == pin || decl.qualified_name() == pin.as_str()
    }
}

/// The dependency resolver for one request configuration.
#[derive(Debug)]
pub struct Resolver<'a> {
    registry: &'a Registry,
    models: &'a ModelHierarchy,
    active_model: InternedString,
    active_backends: HashSet<InternedString>,
    rules: Rules,
}

/// DFS bookkeeping while expanding the graph.
struct Expansion {
    graph: ResolvedGraph,
    resolved: HashSet<FunctorId>,
    on_path: HashSet<FunctorId>,
    /// (functor, quantity display) pairs from the request down to the
    /// node currently being expanded.
    path: Vec<(FunctorId, String)>,
}

impl Expansion {
    /// The "required by" chain for error reports, innermost first.
    fn chain(&self) -> Vec<String> {
        self.path.iter().rev().map(|(_, q)| q.clone()).collect()
    }
}

impl<'a> Resolver<'a> {
    /// Create a resolver. Fails if the active model is unknown.
    pub fn new(
        registry: &'a Registry,
        models: &'a ModelHierarchy,
        active_model: impl AsRef<str>,
        active_backends: impl IntoIterator<Item = impl AsRef<str>>,
        rules: Rules,
    ) -> Result<Self, ResolveError> {
        let active_model = InternedString::new(active_model);
        if !models.contains(active_model) {
            return Err(ResolveError::UnknownModel {
                model: active_model.to_string(),
            });
        }
        Ok(Resolver {
            registry,
            models,
            active_model,
            active_backends: active_backends
                .into_iter()
                .map(InternedString::new)
                .collect(),
            rules,
        })
    }

    /// Resolve the graph for a requested quantity.
    pub fn resolve(&self, request: Quantity) -> Result<ResolvedGraph, ResolveError> {
        debug!(%request, model = %self.active_model, "resolving dependency graph");

        let mut state = Expansion {
            graph: ResolvedGraph::new(request, self.active_model),
            resolved: HashSet::new(),
            on_path: HashSet::new(),
            path: Vec::new(),
        };

        let top = self.resolve_quantity(&mut state, request)?;
        state.graph.finalize(top, self.registry)?;

        debug!(
            members = state.graph.len(),
            scheduled = state.graph.schedule().len(),
            "dependency graph resolved"
        );
        Ok(state.graph)
    }

    /// Select the provider for a quantity and expand it.
    fn resolve_quantity(
        &self,
        state: &mut Expansion,
        quantity: Quantity,
    ) -> Result<FunctorId, ResolveError> {
        let id = self.select_provider(state, quantity)?;
        self.expand_functor(state, id, quantity)?;
        Ok(id)
    }

    /// Pick exactly one provider for a demanded quantity.
    fn select_provider(
        &self,
        state: &Expansion,
        quantity: Quantity,
    ) -> Result<FunctorId, ResolveError> {
        let mut candidates: Vec<FunctorId> = self
            .registry
            .providers(quantity)
            .into_iter()
            .filter(|id| {
                self.registry
                    .functor(*id)
                    .accepts_model(self.models, self.active_model)
            })
            .collect();

        let pin = self.rules.provider_pin(quantity.capability);
        if let Some(pin) = pin {
            candidates.retain(|id| self.rules.matches_pin(self.registry.functor(*id), pin));
        }

        match candidates.len() {
            0 => Err(ResolveError::NoProvider {
                quantity: quantity.to_string(),
                chain: state.chain(),
                model: self.active_model.to_string(),
                pinned_to: pin.map(|p| p.to_string()),
            }),
            1 => {
                debug!(
                    %quantity,
                    provider = %self.registry.functor(candidates[0]).qualified_name(),
                    "provider selected"
                );
                Ok(candidates[0])
            }
            _ => Err(ResolveError::AmbiguousProvider {
                quantity: quantity.to_string(),
                candidates: candidates
                    .iter()
                    .map(|id| self.registry.functor(*id).qualified_name())
                    .collect(),
                chain: state.chain(),
            }),
        }
    }

    /// Expand a selected functor: bind its manager if managed, recurse
    /// into its dependencies, and bind its backend requirements.
    fn expand_functor(
        &self,
        state: &mut Expansion,
        id: FunctorId,
        quantity: Quantity,
    ) -> Result<(), ResolveError> {
        if state.resolved.contains(&id) {
            return Ok(());
        }
        if state.on_path.contains(&id) {
            let first = state
                .path
                .iter()
                .position(|(f, _)| *f == id)
                .unwrap_or(0);
            let mut cycle: Vec<String> =
                state.path[first..].iter().map(|(_, q)| q.clone()).collect();
            cycle.push(quantity.to_string());
            return Err(ResolveError::CyclicDependency {
                quantity: quantity.to_string(),
                cycle,
            });
        }

        state.on_path.insert(id);
        state.path.push((id, quantity.to_string()));

        let result = self.expand_functor_inner(state, id);

        state.path.pop();
        state.on_path.remove(&id);

        if result.is_ok() {
            state.resolved.insert(id);
        }
        result
    }

    fn expand_functor_inner(
        &self,
        state: &mut Expansion,
        id: FunctorId,
    ) -> Result<(), ResolveError> {
        let decl = self.registry.functor(id);

        match decl.managed_by() {
            Some(loop_cap) => {
                state.graph.add_member(id);
                let manager = self.bind_manager(state, id, loop_cap)?;
                state.graph.bind_managed(manager, id);
            }
            None => state.graph.add_node(id),
        }

        // Dependencies, conditional ones only under their activating
        // models.
        for spec in decl.dependencies() {
            let active = spec.is_unconditional()
                || spec
                    .activate_for
                    .iter()
                    .any(|m| self.models.descends_from(self.active_model, *m));
            if !active {
                debug!(
                    functor = %decl.qualified_name(),
                    dependency = %spec.quantity,
                    "conditional dependency inactive under current model"
                );
                continue;
            }

            let provider = self.resolve_quantity(state, spec.quantity)?;
            state
                .graph
                .bind_dependency(id, spec.quantity.capability, provider);

            let from = self.host_of(state, id);
            let to = self.host_of(state, provider);
            state.graph.add_edge(from, to);
        }

        // Backend requirements.
        if !decl.backend_reqs().is_empty() {
            let chain = state.chain();
            let bindings = bind_backends(
                self.registry,
                id,
                &self.active_backends,
                &self.rules,
                &chain,
            )?;
            state.graph.bind_backends(id, bindings);
        }

        Ok(())
    }

    /// Bind the unique loop manager of a managed functor, expanding the
    /// manager itself in the process.
    fn bind_manager(
        &self,
        state: &mut Expansion,
        managed: FunctorId,
        loop_cap: Capability,
    ) -> Result<FunctorId, ResolveError> {
        let candidates = manager_candidates(
            self.registry,
            self.models,
            self.active_model,
            loop_cap,
            &self.rules,
        );

        if candidates.len() != 1 {
            return Err(ResolveError::NoUniqueLoopManager {
                functor: self.registry.functor(managed).qualified_name(),
                loop_capability: loop_cap.to_string(),
                candidates: candidates
                    .iter()
                    .map(|id| self.registry.functor(*id).qualified_name())
                    .collect(),
                chain: state.chain(),
            });
        }

        let manager = candidates[0];
        let manager_quantity =
            Quantity::from_parts(loop_cap, self.registry.functor(manager).result());
        self.expand_functor(state, manager, manager_quantity)?;
        Ok(manager)
    }

    /// The scheduled functor standing in for `id` in the outer graph: the
    /// functor itself, or for managed functors the nearest manager up the
    /// nesting stack that is scheduled.
    fn host_of(&self, state: &Expansion, id: FunctorId) -> FunctorId {
        let mut current = id;
        while !state.graph.is_scheduled(current) {
            match state.graph.manager_of(current) {
                Some(manager) => current = manager,
                None => break,
            }
        }
        current
    }
}
