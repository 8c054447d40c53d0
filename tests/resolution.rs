//! End-to-end resolution and evaluation tests over the example module suite.
//!
//! These tests drive the public API the way the scan driver does: build
//! the example registry and models, resolve a requested quantity under a
//! model and backend set, then evaluate points against the graph.

use proptest::prelude::*;

use capstan::engine::{ComputationError, EvalContext};
use capstan::modules::example;
use capstan::resolver::ResolveError;
use capstan::{
    FunctorDecl, ModelDescriptor, ModelHierarchy, ParameterPoint, Quantity, Registry,
    RegistryBuilder, Resolver, Rules, Session,
};

fn resolver<'a>(
    registry: &'a Registry,
    models: &'a ModelHierarchy,
    model: &str,
    backends: &[&str],
    rules: Rules,
) -> Resolver<'a> {
    Resolver::new(registry, models, model, backends.iter().copied(), rules).unwrap()
}

fn functor_names(registry: &Registry, ids: &[capstan::core::FunctorId]) -> Vec<String> {
    ids.iter()
        .map(|id| registry.functor(*id).function().to_string())
        .collect()
}

// ============================================================================
// Provider selection
// ============================================================================

#[test]
fn test_request_type_disambiguates_nevents() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let dbl = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<f64>("nevents"))
        .unwrap();
    assert_eq!(
        registry.functor(dbl.top()).function().as_str(),
        "nevents_dbl"
    );

    let int = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<i32>("nevents"))
        .unwrap();
    assert_eq!(
        registry.functor(int.top()).function().as_str(),
        "nevents_int"
    );
}

#[test]
fn test_pin_to_unregistered_provider_reports_pin() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let mut rules = Rules::new();
    rules.pin_provider("nevents", "no_such_function");
    let err = resolver(&registry, &models, "test_parent_I", &[], rules)
        .resolve(Quantity::new::<f64>("nevents"))
        .unwrap_err();

    match err {
        ResolveError::NoProvider { pinned_to, .. } => {
            assert_eq!(pinned_to.as_deref(), Some("no_such_function"));
        }
        other => panic!("expected NoProvider, got {other:?}"),
    }
}

#[test]
fn test_no_provider_error_carries_requirement_chain() {
    let registry = example::registry().unwrap();
    let models = example::models();

    // normaldist_loglike is gated to NormalDist, so under test_parent_I
    // the capability has no eligible provider.
    let err = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<f64>("normaldist_loglike"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoProvider { .. }));

    let formatted = err.to_diagnostic().format(false);
    assert!(formatted.contains("normaldist_loglike"));
}

#[test]
fn test_model_gated_provider_resolves_under_its_model() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let graph = resolver(&registry, &models, "NormalDist", &[], Rules::new())
        .resolve(Quantity::new::<f64>("normaldist_loglike"))
        .unwrap();

    let session = Session::new(&registry, &graph);
    let point = ParameterPoint::from_pairs([("mu", 25.0), ("sigma", 2.5)]);
    session.evaluate_point(&point).unwrap();
    let loglike = session.result::<f64>().unwrap();
    assert!(loglike.is_finite());
    assert!(loglike < 0.0);
}

// ============================================================================
// The event loop pipeline
// ============================================================================

#[test]
fn test_nevents_like_pipeline_resolves_and_evaluates() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let graph = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<f64>("nevents_like"))
        .unwrap();

    // Managed functors are members but never scheduled.
    let scheduled = functor_names(&registry, graph.schedule());
    assert!(scheduled.contains(&"event_loop".to_string()));
    assert!(!scheduled.contains(&"event_gen".to_string()));
    assert!(!scheduled.contains(&"event_accumulator".to_string()));

    // The manager runs before the consumers of managed values.
    let loop_pos = scheduled.iter().position(|n| n == "event_loop").unwrap();
    let like_pos = scheduled.iter().position(|n| n == "nevents_like").unwrap();
    assert!(loop_pos < like_pos);

    // Nest order follows dependencies between managed functors.
    let manager = registry.functor_by_name("example", "event_loop").unwrap();
    assert_eq!(
        functor_names(&registry, graph.nest(manager)),
        vec!["event_gen", "event_cut", "event_accumulator"]
    );

    let session = Session::new(&registry, &graph);
    session.evaluate_point(&ParameterPoint::new()).unwrap();

    // 20 iterations, |sin(i*pi/7)| * 50 exceeds the cut except when i is
    // a multiple of 7, so 17 events pass.
    let accumulator = registry
        .functor_by_name("example", "event_accumulator")
        .unwrap();
    assert_eq!(session.value::<i32>(accumulator), Some(17));

    let expected: f64 = 3.5 + 2.2e-5 * 1.0e5;
    let n = 17.0f64;
    let stirling = n * n.ln() - n + 0.5 * (2.0 * std::f64::consts::PI * n).ln();
    let loglike = session.result::<f64>().unwrap();
    assert!((loglike - (n * expected.ln() - expected - stirling)).abs() < 1e-9);
}

#[test]
fn test_managed_state_resets_between_points() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let graph = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<i32>("eventAccumulation"))
        .unwrap();

    let session = Session::new(&registry, &graph);
    session.evaluate_point(&ParameterPoint::new()).unwrap();
    assert_eq!(session.result::<i32>(), Some(17));

    // Accumulation must not leak across points.
    session.evaluate_point(&ParameterPoint::new()).unwrap();
    assert_eq!(session.result::<i32>(), Some(17));
}

#[test]
fn test_managed_functor_without_manager_fails() {
    let mut builder = RegistryBuilder::new();
    builder
        .declare(
            FunctorDecl::new::<f64, _>("orphan", "event_gen", "event", |_| Ok(0.0))
                .needs_manager_with_capability("eventLoopManagement"),
        )
        .unwrap();
    let registry = builder.build();
    let mut models = ModelHierarchy::new();
    models.add(ModelDescriptor::new("any_model")).unwrap();

    let err = resolver(&registry, &models, "any_model", &[], Rules::new())
        .resolve(Quantity::new::<f64>("event"))
        .unwrap_err();
    match err {
        ResolveError::NoUniqueLoopManager { candidates, .. } => assert!(candidates.is_empty()),
        other => panic!("expected NoUniqueLoopManager, got {other:?}"),
    }
}

#[test]
fn test_competing_managers_need_a_pin() {
    fn manager(function: &str) -> FunctorDecl {
        FunctorDecl::new::<(), _>("loops", function, "eventLoopManagement", |ctx| {
            ctx.execute_iteration(0)
        })
        .can_manage_loops()
    }

    let mut builder = RegistryBuilder::new();
    builder.declare(manager("loop_a")).unwrap();
    builder.declare(manager("loop_b")).unwrap();
    builder
        .declare(
            FunctorDecl::new::<f64, _>("loops", "event_gen", "event", |_| Ok(1.0))
                .needs_manager_with_capability("eventLoopManagement"),
        )
        .unwrap();
    let registry = builder.build();
    let mut models = ModelHierarchy::new();
    models.add(ModelDescriptor::new("any_model")).unwrap();

    let err = resolver(&registry, &models, "any_model", &[], Rules::new())
        .resolve(Quantity::new::<f64>("event"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoUniqueLoopManager { .. }));

    let mut rules = Rules::new();
    rules.pin_provider("eventLoopManagement", "loop_b");
    let graph = resolver(&registry, &models, "any_model", &[], rules)
        .resolve(Quantity::new::<f64>("event"))
        .unwrap();
    let manager_id = registry.functor_by_name("loops", "loop_b").unwrap();
    assert_eq!(graph.nest(manager_id).len(), 1);
}

#[test]
fn test_nested_loop_managers_compose() {
    // An inner loop manager that is itself managed binds one level up:
    // the outer manager drives the inner one, which drives the counter.
    let mut builder = RegistryBuilder::new();
    builder
        .declare(
            FunctorDecl::new::<(), _>("nested", "outer_loop", "outerLoopManagement", |ctx| {
                for i in 0..3 {
                    ctx.execute_iteration(i)?;
                }
                Ok(())
            })
            .can_manage_loops(),
        )
        .unwrap();
    let inner = builder
        .declare(
            FunctorDecl::new::<(), _>("nested", "inner_loop", "innerLoopManagement", |ctx| {
                for i in 0..2 {
                    ctx.execute_iteration(i)?;
                }
                Ok(())
            })
            .can_manage_loops()
            .needs_manager_with_capability("outerLoopManagement"),
        )
        .unwrap();
    let counter = builder
        .declare(
            FunctorDecl::new::<i32, _>("nested", "sample_counter", "sampleCount", |ctx| {
                Ok(ctx.previous_value::<i32>().unwrap_or(0) + 1)
            })
            .needs_manager_with_capability("innerLoopManagement"),
        )
        .unwrap();
    builder
        .declare(
            FunctorDecl::new::<i32, _>("nested", "total", "totalSamples", |ctx| {
                ctx.dep::<i32>("sampleCount")
            })
            .depends_on::<i32>("sampleCount"),
        )
        .unwrap();
    let registry = builder.build();
    let mut models = ModelHierarchy::new();
    models.add(ModelDescriptor::new("any_model")).unwrap();

    let graph = resolver(&registry, &models, "any_model", &[], Rules::new())
        .resolve(Quantity::new::<i32>("totalSamples"))
        .unwrap();

    // Only the outermost manager and the consumer are scheduled; each
    // nest holds the next level down.
    assert_eq!(
        functor_names(&registry, graph.schedule()),
        vec!["outer_loop", "total"]
    );
    let outer = registry.functor_by_name("nested", "outer_loop").unwrap();
    assert_eq!(functor_names(&registry, graph.nest(outer)), vec!["inner_loop"]);
    assert_eq!(
        functor_names(&registry, graph.nest(inner)),
        vec!["sample_counter"]
    );

    // 3 outer iterations of 2 inner iterations each.
    let session = Session::new(&registry, &graph);
    session.evaluate_point(&ParameterPoint::new()).unwrap();
    assert_eq!(session.value::<i32>(counter), Some(6));
    assert_eq!(session.result::<i32>(), Some(6));
}

// ============================================================================
// Backend binding
// ============================================================================

#[test]
fn test_group_selection_follows_active_backend() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let graph = resolver(&registry, &models, "test_parent_I", &["MargLike1"], Rules::new())
        .resolve(Quantity::new::<f64>("lnlike_marg_poisson"))
        .unwrap();

    let functor = registry
        .functor_by_name("example", "marg_poisson_test")
        .unwrap();
    let lognormal = graph
        .backend_binding(functor, "lnlike_marg_poisson_lognormal_error")
        .unwrap();
    assert!(lognormal.target.is_some());
    let gaussian = graph
        .backend_binding(functor, "lnlike_marg_poisson_gaussian_error")
        .unwrap();
    assert!(gaussian.target.is_none());

    let session = Session::new(&registry, &graph);
    session.evaluate_point(&ParameterPoint::new()).unwrap();
    assert!(session.result::<f64>().unwrap().is_finite());
}

#[test]
fn test_two_active_group_backends_are_ambiguous() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let err = resolver(
        &registry,
        &models,
        "test_parent_I",
        &["MargLike1", "MargLike2"],
        Rules::new(),
    )
    .resolve(Quantity::new::<f64>("lnlike_marg_poisson"))
    .unwrap_err();
    assert!(matches!(err, ResolveError::AmbiguousBackend { .. }));

    // A group pin settles it.
    let mut rules = Rules::new();
    rules.pin_backend("lnlike_marg_poisson", "MargLike2");
    let graph = resolver(
        &registry,
        &models,
        "test_parent_I",
        &["MargLike1", "MargLike2"],
        rules,
    )
    .resolve(Quantity::new::<f64>("lnlike_marg_poisson"))
    .unwrap();

    let functor = registry
        .functor_by_name("example", "marg_poisson_test")
        .unwrap();
    let gaussian = graph
        .backend_binding(functor, "lnlike_marg_poisson_gaussian_error")
        .unwrap();
    assert!(gaussian.target.is_some());
}

#[test]
fn test_plain_requirement_needs_active_backend() {
    let registry = example::registry().unwrap();
    let models = example::models();

    let err = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<i32>("fastSimEvents"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::BackendUnresolved { .. }));

    let graph = resolver(&registry, &models, "test_parent_I", &["FastSim"], Rules::new())
        .resolve(Quantity::new::<i32>("fastSimEvents"))
        .unwrap();
    let session = Session::new(&registry, &graph);
    session.evaluate_point(&ParameterPoint::new()).unwrap();
    assert_eq!(session.result::<i32>(), Some(25));
}

// ============================================================================
// Model-conditional dependencies
// ============================================================================

#[test]
fn test_conditional_dependency_materializes_per_model() {
    let registry = example::registry().unwrap();
    let models = example::models();
    let xsection = registry.functor_by_name("example", "xsection").unwrap();

    // Under the parent model the xsection correction stays out.
    let parent = resolver(&registry, &models, "test_parent_I", &[], Rules::new())
        .resolve(Quantity::new::<f64>("damu"))
        .unwrap();
    assert!(!parent.contains(xsection));

    // Under the child model it enters the graph.
    let child = resolver(&registry, &models, "CMSSM_I", &[], Rules::new())
        .resolve(Quantity::new::<f64>("damu"))
        .unwrap();
    assert!(child.contains(xsection));

    let point = ParameterPoint::from_pairs([
        ("p1", 2.0),
        ("p2", 1.0),
        ("p3", 1.0),
        ("M0", 100.0),
        ("M12", 250.0),
    ]);

    let session = Session::new(&registry, &parent);
    session.evaluate_point(&point).unwrap();
    let without = session.result::<f64>().unwrap();

    let session = Session::new(&registry, &child);
    session.evaluate_point(&point).unwrap();
    let with = session.result::<f64>().unwrap();

    assert!(with > without);
}

// ============================================================================
// Schedule determinism
// ============================================================================

proptest! {
    /// Random acyclic dependency structures always schedule providers
    /// before their consumers.
    #[test]
    fn prop_schedule_respects_dependencies(
        deps in prop::collection::vec(
            prop::collection::vec(any::<prop::sample::Index>(), 0..3),
            1..8,
        )
    ) {
        let mut builder = RegistryBuilder::new();
        let mut ids = Vec::new();
        for (i, targets) in deps.iter().enumerate() {
            let mut decl = FunctorDecl::new::<f64, _>(
                "generated",
                format!("f{i}"),
                format!("cap{i}"),
                |_: &EvalContext<'_>| Ok::<f64, ComputationError>(0.0),
            );
            if i > 0 {
                let mut seen = Vec::new();
                for target in targets {
                    let t = target.index(i);
                    if !seen.contains(&t) {
                        seen.push(t);
                        decl = decl.depends_on::<f64>(format!("cap{t}"));
                    }
                }
            }
            ids.push(builder.declare(decl).unwrap());
        }
        // A root demanding everything keeps the whole set reachable.
        let mut root = FunctorDecl::new::<f64, _>(
            "generated",
            "root",
            "root",
            |_: &EvalContext<'_>| Ok::<f64, ComputationError>(0.0),
        );
        for i in 0..deps.len() {
            root = root.depends_on::<f64>(format!("cap{i}"));
        }
        builder.declare(root).unwrap();
        let registry = builder.build();
        let mut models = ModelHierarchy::new();
        models.add(ModelDescriptor::new("any_model")).unwrap();

        let graph = resolver(&registry, &models, "any_model", &[], Rules::new())
            .resolve(Quantity::new::<f64>("root"))
            .unwrap();

        let position = |id| graph.schedule().iter().position(|s| *s == id).unwrap();
        for &id in graph.schedule() {
            for (_, provider) in graph.deps_of(id) {
                prop_assert!(position(*provider) < position(id));
            }
        }
        // Every declared functor is reachable through the root.
        prop_assert_eq!(graph.schedule().len(), ids.len() + 1);
    }
}
