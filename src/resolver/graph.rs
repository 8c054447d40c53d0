//! The resolved execution graph.
//!
//! Once the resolver finishes, a `ResolvedGraph` is read-only: the
//! selected providers, the dependency bindings, the backend bindings,
//! the manager nest lists, and the deterministic schedule are all fixed
//! for the lifetime of the scan. Managed functors are members of the
//! graph but never appear in the outer schedule; they run inside their
//! manager's loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::{BackendFnId, Capability, FunctorId, Quantity, Registry};
use crate::resolver::errors::ResolveError;
use crate::util::InternedString;

/// The outcome of binding one backend requirement.
#[derive(Debug, Clone)]
pub struct BackendBinding {
    /// Required symbol.
    pub symbol: InternedString,
    /// Group the requirement belongs to, if any.
    pub group: Option<InternedString>,
    /// Bound backend function. `None` only for group members left
    /// deliberately unbound by the group's backend selection.
    pub target: Option<BackendFnId>,
}

/// The concrete DAG of bound functors produced for one request.
#[derive(Debug)]
pub struct ResolvedGraph {
    request: Quantity,
    model: InternedString,

    /// Dependency structure over scheduled functors. Edge a -> b means
    /// "a depends on b".
    graph: DiGraph<FunctorId, ()>,
    node_of: HashMap<FunctorId, NodeIndex>,

    /// Every selected functor, managed ones included, in selection order.
    members: Vec<FunctorId>,
    member_index: HashMap<FunctorId, usize>,

    /// Resolved dependency slots per functor.
    deps: HashMap<FunctorId, Vec<(Capability, FunctorId)>>,

    /// Backend bindings per functor.
    backends: HashMap<FunctorId, Vec<BackendBinding>>,

    /// Managed functors per manager, in nest execution order.
    nests: HashMap<FunctorId, Vec<FunctorId>>,

    /// Manager per managed functor.
    managers: HashMap<FunctorId, FunctorId>,

    /// Evaluation order over scheduled functors, dependencies first.
    schedule: Vec<FunctorId>,

    /// The functor answering the request.
    top: Option<FunctorId>,
}

impl ResolvedGraph {
    /// Create an empty graph for a request under an active model.
    pub fn new(request: Quantity, model: InternedString) -> Self {
        ResolvedGraph {
            request,
            model,
            graph: DiGraph::new(),
            node_of: HashMap::new(),
            members: Vec::new(),
            member_index: HashMap::new(),
            deps: HashMap::new(),
            backends: HashMap::new(),
            nests: HashMap::new(),
            managers: HashMap::new(),
            schedule: Vec::new(),
            top: None,
        }
    }

    /// Record a selected functor.
    pub fn add_member(&mut self, id: FunctorId) {
        if !self.member_index.contains_key(&id) {
            self.member_index.insert(id, self.members.len());
            self.members.push(id);
        }
    }

    /// Add a functor to the outer schedule's node set.
    pub fn add_node(&mut self, id: FunctorId) {
        self.add_member(id);
        if !self.node_of.contains_key(&id) {
            let node = self.graph.add_node(id);
            self.node_of.insert(id, node);
        }
    }

    /// Add a dependency edge between scheduled functors.
    pub fn add_edge(&mut self, from: FunctorId, to: FunctorId) {
        if from == to {
            return;
        }
        if let (Some(&from_node), Some(&to_node)) =
            (self.node_of.get(&from), self.node_of.get(&to))
        {
            if !self.graph.contains_edge(from_node, to_node) {
                self.graph.add_edge(from_node, to_node, ());
            }
        }
    }

    /// Record a resolved dependency slot.
    pub fn bind_dependency(&mut self, consumer: FunctorId, capability: Capability, provider: FunctorId) {
        self.deps
            .entry(consumer)
            .or_default()
            .push((capability, provider));
    }

    /// Record the backend bindings of a functor.
    pub fn bind_backends(&mut self, functor: FunctorId, bindings: Vec<BackendBinding>) {
        self.backends.insert(functor, bindings);
    }

    /// Record a manager/managed pair.
    pub fn bind_managed(&mut self, manager: FunctorId, managed: FunctorId) {
        self.nests.entry(manager).or_default().push(managed);
        self.managers.insert(managed, manager);
    }

    /// Compute the deterministic schedule and fix the top-level functor.
    ///
    /// Dependencies precede dependents; ties among independent functors
    /// break by registration order. The cycle check here is a backstop;
    /// the resolver rejects cycles during expansion.
    pub fn finalize(&mut self, top: FunctorId, registry: &Registry) -> Result<(), ResolveError> {
        self.top = Some(top);

        let mut remaining: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: BinaryHeap<Reverse<FunctorId>> = BinaryHeap::new();

        for node in self.graph.node_indices() {
            let deps = self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .count();
            remaining.insert(node, deps);
            if deps == 0 {
                ready.push(Reverse(self.graph[node]));
            }
        }

        let mut schedule = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(id)) = ready.pop() {
            schedule.push(id);
            let node = self.node_of[&id];
            for dependent in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
            {
                let r = remaining.get_mut(&dependent).unwrap();
                *r -= 1;
                if *r == 0 {
                    ready.push(Reverse(self.graph[dependent]));
                }
            }
        }

        if schedule.len() != self.graph.node_count() {
            let stuck: Vec<String> = self
                .graph
                .node_indices()
                .filter(|n| !schedule.contains(&self.graph[*n]))
                .map(|n| registry.functor(self.graph[n]).qualified_name())
                .collect();
            return Err(ResolveError::CyclicDependency {
                quantity: self.request.to_string(),
                cycle: stuck,
            });
        }

        self.schedule = schedule;
        self.order_nests();
        Ok(())
    }

    /// Order each manager's nest so managed functors run after the
    /// managed functors they depend on, ties broken by registration
    /// order. Nest-internal edges cannot cycle: the resolver's DFS path
    /// check already rejected them.
    fn order_nests(&mut self) {
        let deps = &self.deps;
        for nest in self.nests.values_mut() {
            let mut ordered: Vec<FunctorId> = Vec::with_capacity(nest.len());
            let mut pending: Vec<FunctorId> = nest.clone();
            pending.sort();
            while !pending.is_empty() {
                let next = pending
                    .iter()
                    .position(|m| {
                        deps.get(m)
                            .map(Vec::as_slice)
                            .unwrap_or(&[])
                            .iter()
                            .all(|(_, d)| !pending.contains(d))
                    })
                    .unwrap_or(0);
                ordered.push(pending.remove(next));
            }
            *nest = ordered;
        }
    }

    /// The requested quantity.
    pub fn request(&self) -> Quantity {
        self.request
    }

    /// The active model the graph was resolved under.
    pub fn model(&self) -> InternedString {
        self.model
    }

    /// The functor answering the request.
    pub fn top(&self) -> FunctorId {
        self.top.expect("graph not finalized")
    }

    /// Evaluation order over scheduled functors.
    pub fn schedule(&self) -> &[FunctorId] {
        &self.schedule
    }

    /// Every selected functor, managed ones included.
    pub fn members(&self) -> &[FunctorId] {
        &self.members
    }

    /// Dense per-graph index of a member functor.
    pub fn member_index(&self, id: FunctorId) -> Option<usize> {
        self.member_index.get(&id).copied()
    }

    /// Check membership.
    pub fn contains(&self, id: FunctorId) -> bool {
        self.member_index.contains_key(&id)
    }

    /// True when the functor appears in the outer schedule.
    pub fn is_scheduled(&self, id: FunctorId) -> bool {
        self.node_of.contains_key(&id)
    }

    /// Resolved dependency slots of a functor.
    pub fn deps_of(&self, id: FunctorId) -> &[(Capability, FunctorId)] {
        self.deps.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve a dependency slot by capability name.
    pub fn dependency(&self, id: FunctorId, capability: &str) -> Option<FunctorId> {
        self.deps_of(id)
            .iter()
            .find(|(cap, _)| cap.as_str() == capability)
            .map(|(_, provider)| *provider)
    }

    /// Backend bindings of a functor.
    pub fn backend_bindings(&self, id: FunctorId) -> &[BackendBinding] {
        self.backends.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up one backend binding by symbol.
    pub fn backend_binding(&self, id: FunctorId, symbol: &str) -> Option<&BackendBinding> {
        self.backend_bindings(id)
            .iter()
            .find(|b| b.symbol.as_str() == symbol)
    }

    /// Managed functors of a manager, in nest execution order.
    pub fn nest(&self, manager: FunctorId) -> &[FunctorId] {
        self.nests.get(&manager).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The manager of a managed functor.
    pub fn manager_of(&self, managed: FunctorId) -> Option<FunctorId> {
        self.managers.get(&managed).copied()
    }

    /// Number of member functors.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
