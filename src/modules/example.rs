//! The `example` module: a self-contained suite of toy-physics functors.
//!
//! The suite covers every declaration feature: plain and typed-distinct
//! providers, an event loop with managed generators and accumulators,
//! model-conditional dependencies, grouped and plain backend
//! requirements. Numbers are toy values, not physics.

use std::f64::consts::PI;

use crate::core::{
    BackendEntry, FunctorDecl, ModelDescriptor, ModelHierarchy, Registry, RegistryBuilder,
    RegistryError,
};
use crate::engine::ComputationError;

/// Iterations of the example event loop.
const EVENT_LOOP_LENGTH: usize = 20;

/// Pseudo-data for the normal-distribution likelihood.
const NORMAL_OBSERVATIONS: [f64; 4] = [23.0, 19.0, 33.0, 18.0];

/// The example model hierarchy.
///
/// `CMSSM_I` is a child of `test_parent_I`: points sampled for it carry
/// its own parameters plus the inherited parent ones.
pub fn models() -> ModelHierarchy {
    let mut hierarchy = ModelHierarchy::new();
    hierarchy
        .add(
            ModelDescriptor::new("test_parent_I")
                .with_param("p1", 1.0, 0.0, 5.0)
                .with_param("p2", 1.0, 0.0, 5.0)
                .with_param("p3", 1.0, 0.0, 5.0),
        )
        .expect("example models are well-formed");
    hierarchy
        .add(
            ModelDescriptor::new("CMSSM_I")
                .with_parent("test_parent_I")
                .with_param("M0", 100.0, 50.0, 500.0)
                .with_param("M12", 250.0, 100.0, 1000.0),
        )
        .expect("example models are well-formed");
    hierarchy
        .add(
            ModelDescriptor::new("NormalDist")
                .with_param("mu", 25.0, 15.0, 45.0)
                .with_param("sigma", 2.5, 0.5, 10.0),
        )
        .expect("example models are well-formed");
    hierarchy
}

/// The example registry: functors plus backend functions.
pub fn registry() -> Result<Registry, RegistryError> {
    let mut builder = RegistryBuilder::new();
    declare_functors(&mut builder)?;
    declare_backends(&mut builder)?;
    Ok(builder.build())
}

fn declare_functors(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    // A toy cross-section in picobarns.
    builder.declare(FunctorDecl::new::<f64, _>(
        "example",
        "xsection",
        "xsection",
        |_| Ok(2.2e-5),
    ))?;

    // Expected event count from the cross-section.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "nevents_dbl", "nevents", |ctx| {
            let xsection = ctx.dep::<f64>("xsection")?;
            Ok(3.5 + xsection * 1.0e5)
        })
        .depends_on::<f64>("xsection"),
    )?;

    // Rounded event count. Provides the same capability at a different
    // type, so it never competes with `nevents_dbl` for f64 demands.
    builder.declare(
        FunctorDecl::new::<i32, _>("example", "nevents_int", "nevents", |ctx| {
            Ok(ctx.dep::<f64>("nevents")?.round() as i32)
        })
        .depends_on::<f64>("nevents"),
    )?;

    // Poisson log-likelihood of the accumulated events given the
    // expected count.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "nevents_like", "nevents_like", |ctx| {
            let expected = ctx.dep::<f64>("nevents")?;
            let observed = ctx.dep::<i32>("eventAccumulation")?;
            if expected <= 0.0 {
                return Err(ComputationError::invalid(format!(
                    "expected event count must be positive, got {expected}"
                )));
            }
            let observed = observed as f64;
            Ok(observed * expected.ln() - expected - ln_factorial(observed))
        })
        .depends_on::<f64>("nevents")
        .depends_on::<i32>("eventAccumulation"),
    )?;

    // The event loop manager. Managed functors bound to
    // `eventLoopManagement` run once per iteration, in nest order.
    builder.declare(
        FunctorDecl::new::<(), _>("example", "event_loop", "eventLoopManagement", |ctx| {
            for iteration in 0..EVENT_LOOP_LENGTH {
                ctx.execute_iteration(iteration)?;
            }
            Ok(())
        })
        .can_manage_loops(),
    )?;

    // One pseudo-event per iteration.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "event_gen", "event", |ctx| {
            let iteration = ctx.iteration().ok_or_else(|| {
                ComputationError::invalid("event generation ran outside a loop")
            })? as f64;
            Ok((iteration * PI / 7.0).sin().abs() * 50.0)
        })
        .needs_manager_with_capability("eventLoopManagement"),
    )?;

    // Accept/reject decision on the generated event.
    builder.declare(
        FunctorDecl::new::<i32, _>("example", "event_cut", "event", |ctx| {
            let energy = ctx.dep::<f64>("event")?;
            Ok(if energy > 20.0 { 1 } else { 0 })
        })
        .depends_on::<f64>("event")
        .needs_manager_with_capability("eventLoopManagement"),
    )?;

    // Running tally of accepted events across loop iterations.
    builder.declare(
        FunctorDecl::new::<i32, _>("example", "event_accumulator", "eventAccumulation", |ctx| {
            let accepted = ctx.dep::<i32>("event")?;
            Ok(ctx.previous_value::<i32>().unwrap_or(0) + accepted)
        })
        .depends_on::<i32>("event")
        .needs_manager_with_capability("eventLoopManagement"),
    )?;

    // Muon anomalous magnetic moment contribution. The cross-section
    // correction only enters for CMSSM_I points.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "damu", "damu", |ctx| {
            let base = ctx.point().get("p1").unwrap_or(1.0) * 1.0e-9;
            let correction = ctx.optional_dep::<f64>("xsection")?.unwrap_or(0.0);
            Ok(base + correction * 1.0e-6)
        })
        .allow_models(["test_parent_I", "NormalDist"])
        .depends_on_for_models::<f64>("xsection", ["CMSSM_I"]),
    )?;

    // Gaussian log-likelihood of the pseudo-data under NormalDist.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "normaldist_loglike", "normaldist_loglike", |ctx| {
            let mu = ctx.param("mu")?;
            let sigma = ctx.param("sigma")?;
            if sigma <= 0.0 {
                return Err(ComputationError::invalid(format!(
                    "sigma must be positive, got {sigma}"
                )));
            }
            let mut loglike = 0.0;
            for x in NORMAL_OBSERVATIONS {
                let pull = (x - mu) / sigma;
                loglike += -0.5 * pull * pull - sigma.ln() - 0.5 * (2.0 * PI).ln();
            }
            Ok(loglike)
        })
        .allow_models(["NormalDist"]),
    )?;

    // Marginalized Poisson likelihood. Exactly one member of the group
    // binds, fixed by whichever backend is active; the functor asks
    // which one it got.
    builder.declare(
        FunctorDecl::new::<f64, _>("example", "marg_poisson_test", "lnlike_marg_poisson", |ctx| {
            let observed = ctx.dep::<i32>("nevents")?;
            let lnlike = if ctx.has_backend("lnlike_marg_poisson_lognormal_error") {
                ctx.backend::<(i32, f64, f64, f64), f64>(
                    "lnlike_marg_poisson_lognormal_error",
                )?
                .call((observed, 3.5, 0.0, 0.05))
            } else {
                ctx.backend::<(i32, f64, f64, f64), f64>(
                    "lnlike_marg_poisson_gaussian_error",
                )?
                .call((observed, 3.5, 0.0, 0.05))
            };
            Ok(lnlike)
        })
        .depends_on::<i32>("nevents")
        .requires_backend_from_group::<(i32, f64, f64, f64), f64>(
            "lnlike_marg_poisson",
            "lnlike_marg_poisson_lognormal_error",
        )
        .requires_backend_from_group::<(i32, f64, f64, f64), f64>(
            "lnlike_marg_poisson",
            "lnlike_marg_poisson_gaussian_error",
        ),
    )?;

    // Detector fast-simulation seeded through a plain backend call.
    builder.declare(
        FunctorDecl::new::<i32, _>("example", "fast_sim", "fastSimEvents", |ctx| {
            let init = ctx.backend::<(i32,), i32>("fast_sim_init")?;
            Ok(init.call((12,)))
        })
        .requires_backend::<(i32,), i32>("fast_sim_init"),
    )?;

    Ok(())
}

fn declare_backends(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.declare_backend_fn(BackendEntry::new(
        "MargLike1",
        "lnlike_marg_poisson_lognormal_error",
        |(observed, expected, _offset, error): (i32, f64, f64, f64)| -> f64 {
            marg_poisson(observed, expected * (1.0 + error))
        },
    ))?;

    builder.declare_backend_fn(BackendEntry::new(
        "MargLike2",
        "lnlike_marg_poisson_gaussian_error",
        |(observed, expected, _offset, error): (i32, f64, f64, f64)| -> f64 {
            marg_poisson(observed, expected + error)
        },
    ))?;

    builder.declare_backend_fn(BackendEntry::new(
        "FastSim",
        "fast_sim_init",
        |(seed,): (i32,)| -> i32 { seed * 2 + 1 },
    ))?;

    Ok(())
}

fn marg_poisson(observed: i32, expected: f64) -> f64 {
    let observed = observed as f64;
    observed * expected.ln() - expected - ln_factorial(observed)
}

/// Stirling's approximation, exact enough for toy likelihoods.
fn ln_factorial(n: f64) -> f64 {
    if n < 2.0 {
        return 0.0;
    }
    n * n.ln() - n + 0.5 * (2.0 * PI * n).ln()
}
