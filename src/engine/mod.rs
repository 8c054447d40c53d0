//! Point evaluation over a resolved graph.
//!
//! A [`Session`] holds per-point value slots for every member of a
//! [`ResolvedGraph`]. Evaluating a point invalidates every slot, then
//! runs the schedule in order; loop managers drive their nest members
//! through [`EvalContext::execute_iteration`]. The graph itself is never
//! mutated, so one graph can back many sessions in parallel.

pub mod errors;

use std::cell::RefCell;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::core::{BackendFn, FunctorId, ParameterPoint, Registry, Value};
use crate::resolver::ResolvedGraph;

pub use errors::{ComputationError, EvalError};

/// One per-point value slot.
#[derive(Default)]
struct Slot {
    /// True once the slot was computed for the current point.
    fresh: bool,
    value: Option<Value>,
}

/// Mutable evaluation state for one graph.
pub struct Session<'a> {
    registry: &'a Registry,
    graph: &'a ResolvedGraph,
    slots: Vec<RefCell<Slot>>,
    /// Stack of active loop iteration indices, innermost last.
    iterations: RefCell<Vec<usize>>,
}

impl<'a> Session<'a> {
    /// Create a session with every slot stale.
    pub fn new(registry: &'a Registry, graph: &'a ResolvedGraph) -> Self {
        let slots = (0..graph.len()).map(|_| RefCell::new(Slot::default())).collect();
        Session {
            registry,
            graph,
            slots,
            iterations: RefCell::new(Vec::new()),
        }
    }

    /// The graph this session evaluates.
    pub fn graph(&self) -> &ResolvedGraph {
        self.graph
    }

    /// Mark every slot stale and drop its cached value.
    pub fn invalidate_all(&self) {
        for slot in &self.slots {
            let mut slot = slot.borrow_mut();
            slot.fresh = false;
            slot.value = None;
        }
    }

    /// Evaluate the full schedule for one parameter point.
    ///
    /// On failure every slot is left stale; no partial results survive.
    pub fn evaluate_point(&self, point: &ParameterPoint) -> Result<(), EvalError> {
        self.invalidate_all();
        debug!(point = %point, model = %self.graph.model(), "evaluating point");

        for &id in self.graph.schedule() {
            if let Err(err) = self.evaluate_functor(id, point) {
                self.invalidate_all();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Evaluate one functor, recomputing even if its slot is fresh.
    ///
    /// Dependencies must already be fresh; the schedule guarantees this
    /// for outer functors, nest order for managed ones.
    pub fn evaluate_functor(&self, id: FunctorId, point: &ParameterPoint) -> Result<(), EvalError> {
        let decl = self.registry.functor(id);

        for (capability, provider) in self.graph.deps_of(id) {
            if !self.is_fresh(*provider) {
                return Err(EvalError::DependencyNotReady {
                    functor: decl.qualified_name(),
                    dependency: capability.to_string(),
                });
            }
        }
        for binding in self.graph.backend_bindings(id) {
            if binding.group.is_none() && binding.target.is_none() {
                return Err(EvalError::BackendUnresolved {
                    functor: decl.qualified_name(),
                    symbol: binding.symbol.to_string(),
                });
            }
        }

        trace!(functor = %decl.qualified_name(), "computing");
        let ctx = EvalContext {
            session: self,
            functor: id,
            point,
        };
        let value = (decl.compute())(&ctx).map_err(|err| match err {
            ComputationError::BackendUnresolved { symbol } => EvalError::BackendUnresolved {
                functor: decl.qualified_name(),
                symbol,
            },
            ComputationError::DependencyStale { capability } => EvalError::DependencyNotReady {
                functor: decl.qualified_name(),
                dependency: capability,
            },
            ComputationError::Nested(inner) => *inner,
            other => EvalError::ComputationFailure {
                functor: decl.qualified_name(),
                source: other,
            },
        })?;

        let index = self
            .graph
            .member_index(id)
            .expect("functor is a graph member");
        let mut slot = self.slots[index].borrow_mut();
        slot.value = Some(value);
        slot.fresh = true;
        Ok(())
    }

    /// The fresh value of a functor, if any.
    pub fn value<T: Clone + 'static>(&self, id: FunctorId) -> Option<T> {
        let index = self.graph.member_index(id)?;
        let slot = self.slots[index].borrow();
        if !slot.fresh {
            return None;
        }
        slot.value.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// The fresh value of the functor answering the request.
    pub fn result<T: Clone + 'static>(&self) -> Option<T> {
        self.value(self.graph.top())
    }

    fn is_fresh(&self, id: FunctorId) -> bool {
        self.graph
            .member_index(id)
            .map(|index| self.slots[index].borrow().fresh)
            .unwrap_or(false)
    }
}

/// What a compute closure sees while running.
pub struct EvalContext<'s> {
    session: &'s Session<'s>,
    functor: FunctorId,
    point: &'s ParameterPoint,
}

impl<'s> EvalContext<'s> {
    /// Read a resolved dependency value.
    pub fn dep<T: Clone + 'static>(&self, capability: &str) -> Result<T, ComputationError> {
        let provider = self.session.graph.dependency(self.functor, capability).ok_or_else(
            || ComputationError::UnknownDependency {
                capability: capability.to_string(),
            },
        )?;
        if !self.session.is_fresh(provider) {
            return Err(ComputationError::DependencyStale {
                capability: capability.to_string(),
            });
        }
        self.session
            .value::<T>(provider)
            .ok_or_else(|| ComputationError::DependencyType {
                capability: capability.to_string(),
            })
    }

    /// Read a dependency that may be inactive under the current model.
    pub fn optional_dep<T: Clone + 'static>(
        &self,
        capability: &str,
    ) -> Result<Option<T>, ComputationError> {
        if self.session.graph.dependency(self.functor, capability).is_none() {
            return Ok(None);
        }
        self.dep(capability).map(Some)
    }

    /// Read a model parameter of the current point.
    pub fn param(&self, name: &str) -> Result<f64, ComputationError> {
        self.point
            .get(name)
            .ok_or_else(|| ComputationError::UnknownParameter {
                name: name.to_string(),
            })
    }

    /// The full parameter point.
    pub fn point(&self) -> &ParameterPoint {
        self.point
    }

    /// The innermost active loop iteration index, if any.
    pub fn iteration(&self) -> Option<usize> {
        self.session.iterations.borrow().last().copied()
    }

    /// The value this functor computed on the previous loop iteration.
    ///
    /// `None` on the first iteration of each point; point evaluation
    /// clears every slot before the schedule runs.
    pub fn previous_value<T: Clone + 'static>(&self) -> Option<T> {
        self.session.value(self.functor)
    }

    /// Fetch the typed handle of a bound backend requirement.
    pub fn backend<Args: 'static, Ret: 'static>(
        &self,
        symbol: &str,
    ) -> Result<BackendFn<Args, Ret>, ComputationError> {
        let binding = self
            .session
            .graph
            .backend_binding(self.functor, symbol)
            .ok_or_else(|| ComputationError::BackendUnresolved {
                symbol: symbol.to_string(),
            })?;
        let target = binding.target.ok_or_else(|| ComputationError::BackendUnresolved {
            symbol: symbol.to_string(),
        })?;
        self.session
            .registry
            .backend_fn(target)
            .typed::<Args, Ret>()
            .ok_or_else(|| ComputationError::BackendSignature {
                symbol: symbol.to_string(),
            })
    }

    /// True when the requirement is bound to a concrete backend function.
    /// Group members left unbound by the group's selection report false.
    pub fn has_backend(&self, symbol: &str) -> bool {
        self.session
            .graph
            .backend_binding(self.functor, symbol)
            .is_some_and(|b| b.target.is_some())
    }

    /// Run one loop iteration: evaluate every nest member of this
    /// manager, in nest order.
    pub fn execute_iteration(&self, iteration: usize) -> Result<(), ComputationError> {
        self.session.iterations.borrow_mut().push(iteration);
        let result = self
            .session
            .graph
            .nest(self.functor)
            .iter()
            .try_for_each(|&member| {
                self.session
                    .evaluate_functor(member, self.point)
                    .map_err(|err| ComputationError::Nested(Box::new(err)))
            });
        self.session.iterations.borrow_mut().pop();
        result
    }
}

/// Evaluate many points against one graph, in parallel.
///
/// Each point gets its own session; results come back in input order.
pub fn evaluate_points<T>(
    registry: &Registry,
    graph: &ResolvedGraph,
    points: &[ParameterPoint],
) -> Vec<Result<T, EvalError>>
where
    T: Clone + Send + 'static,
{
    points
        .par_iter()
        .map(|point| {
            let session = Session::new(registry, graph);
            session.evaluate_point(point)?;
            session
                .result::<T>()
                .ok_or_else(|| EvalError::ResultUnavailable {
                    quantity: graph.request().to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::core::{FunctorDecl, ModelDescriptor, ModelHierarchy, Quantity, RegistryBuilder};
    use crate::resolver::{Resolver, Rules};

    fn models() -> ModelHierarchy {
        let mut h = ModelHierarchy::new();
        h.add(ModelDescriptor::new("any_model").with_param("p1", 0.0, -10.0, 10.0))
            .unwrap();
        h
    }

    fn resolve(registry: &Registry, request: Quantity) -> ResolvedGraph {
        let hierarchy = models();
        Resolver::new(
            registry,
            &hierarchy,
            "any_model",
            Vec::<&str>::new(),
            Rules::new(),
        )
        .unwrap()
        .resolve(request)
        .unwrap()
    }

    #[test]
    fn test_values_recompute_after_invalidation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut builder = RegistryBuilder::new();
        builder
            .declare(FunctorDecl::new::<f64, _>(
                "example",
                "xsection",
                "xsection",
                move |ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ctx.param("p1")? * 2.0)
                },
            ))
            .unwrap();
        let registry = builder.build();
        let graph = resolve(&registry, Quantity::new::<f64>("xsection"));

        let session = Session::new(&registry, &graph);
        let point = ParameterPoint::from_pairs([("p1", 3.0)]);
        session.evaluate_point(&point).unwrap();
        assert_eq!(session.result::<f64>(), Some(6.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A second point recomputes from scratch.
        let point = ParameterPoint::from_pairs([("p1", 5.0)]);
        session.evaluate_point(&point).unwrap();
        assert_eq!(session.result::<f64>(), Some(10.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_out_of_order_evaluation_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare(FunctorDecl::new::<f64, _>(
                "example",
                "xsection",
                "xsection",
                |_| Ok(1.0),
            ))
            .unwrap();
        let dependent = builder
            .declare(
                FunctorDecl::new::<f64, _>("example", "nevents", "nevents", |ctx| {
                    Ok(ctx.dep::<f64>("xsection")? + 1.0)
                })
                .depends_on::<f64>("xsection"),
            )
            .unwrap();
        let registry = builder.build();
        let graph = resolve(&registry, Quantity::new::<f64>("nevents"));

        let session = Session::new(&registry, &graph);
        let point = ParameterPoint::new();
        let err = session.evaluate_functor(dependent, &point).unwrap_err();
        assert!(matches!(err, EvalError::DependencyNotReady { .. }));
    }

    #[test]
    fn test_failure_leaves_no_partial_results() {
        let mut builder = RegistryBuilder::new();
        let provider = builder
            .declare(FunctorDecl::new::<f64, _>(
                "example",
                "xsection",
                "xsection",
                |_| Ok(1.0),
            ))
            .unwrap();
        builder
            .declare(
                FunctorDecl::new::<f64, _>("example", "nevents", "nevents", |_| {
                    Err(ComputationError::invalid("negative event count"))
                })
                .depends_on::<f64>("xsection"),
            )
            .unwrap();
        let registry = builder.build();
        let graph = resolve(&registry, Quantity::new::<f64>("nevents"));

        let session = Session::new(&registry, &graph);
        let err = session.evaluate_point(&ParameterPoint::new()).unwrap_err();
        assert!(matches!(err, EvalError::ComputationFailure { .. }));
        // The provider ran before the failure but its value is gone.
        assert_eq!(session.value::<f64>(provider), None);
    }

    #[test]
    fn test_loop_accumulation_across_iterations() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare(
                FunctorDecl::new::<(), _>("example", "event_loop", "eventLoopManagement", |ctx| {
                    for i in 0..4 {
                        ctx.execute_iteration(i)?;
                    }
                    Ok(())
                })
                .can_manage_loops(),
            )
            .unwrap();
        let accumulator = builder
            .declare(
                FunctorDecl::new::<i32, _>("example", "event_accumulator", "eventAccumulation", |ctx| {
                    let so_far = ctx.previous_value::<i32>().unwrap_or(0);
                    Ok(so_far + 1)
                })
                .needs_manager_with_capability("eventLoopManagement"),
            )
            .unwrap();
        builder
            .declare(
                FunctorDecl::new::<i32, _>("example", "tally", "tally", |ctx| {
                    ctx.dep::<i32>("eventAccumulation")
                })
                .depends_on::<i32>("eventAccumulation"),
            )
            .unwrap();
        let registry = builder.build();
        let graph = resolve(&registry, Quantity::new::<i32>("tally"));

        let session = Session::new(&registry, &graph);
        session.evaluate_point(&ParameterPoint::new()).unwrap();
        assert_eq!(session.value::<i32>(accumulator), Some(4));
        assert_eq!(session.result::<i32>(), Some(4));
    }

    #[test]
    fn test_parallel_points_are_independent() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare(FunctorDecl::new::<f64, _>(
                "example",
                "xsection",
                "xsection",
                |ctx| Ok(ctx.param("p1")? + 0.5),
            ))
            .unwrap();
        let registry = builder.build();
        let graph = resolve(&registry, Quantity::new::<f64>("xsection"));

        let points: Vec<ParameterPoint> = (0..16)
            .map(|i| ParameterPoint::from_pairs([("p1", i as f64)]))
            .collect();
        let results = evaluate_points::<f64>(&registry, &graph, &points);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(*result.as_ref().unwrap(), i as f64 + 0.5);
        }
    }
}
