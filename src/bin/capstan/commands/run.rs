//! `capstan run` command

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cli::RunArgs;
use capstan::engine::evaluate_points;
use capstan::modules::example;
use capstan::util::config::ScanConfig;
use capstan::{InternedString, ParameterPoint, Quantity, Resolver};

/// Points handed to the evaluation pool per progress tick.
const BATCH: usize = 32;

pub fn execute(args: RunArgs, color: bool) -> Result<()> {
    let mut config = ScanConfig::load(&args.config)?;
    if let Some(points) = args.points {
        config.scan.points = points;
    }
    if let Some(seed) = args.seed {
        config.scan.seed = Some(seed);
    }

    let hierarchy = example::models();
    let registry = example::registry()?;
    let request = Quantity::new::<f64>(&config.request.capability);

    let resolver = match Resolver::new(
        &registry,
        &hierarchy,
        &config.request.model,
        &config.request.backends,
        config.to_rules(),
    ) {
        Ok(resolver) => resolver,
        Err(err) => {
            super::report_resolution_failure(&err, color);
            anyhow::bail!("resolution failed");
        }
    };
    let graph = match resolver.resolve(request) {
        Ok(graph) => graph,
        Err(err) => {
            super::report_resolution_failure(&err, color);
            anyhow::bail!("resolution failed");
        }
    };

    println!(
        "resolved `{}` under `{}`: {} functors, {} scheduled",
        request,
        graph.model(),
        graph.len(),
        graph.schedule().len()
    );

    // Sample points uniformly over the model's parameter ranges.
    let params = hierarchy.parameters(InternedString::new(&config.request.model))?;
    let mut rng = match config.scan.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let points: Vec<ParameterPoint> = (0..config.scan.points)
        .map(|_| {
            let mut point = ParameterPoint::new();
            for p in &params {
                point.set(p.name, rng.gen_range(p.low..=p.high));
            }
            point
        })
        .collect();

    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} points",
    )?);

    let mut results = Vec::with_capacity(points.len());
    for batch in points.chunks(BATCH) {
        results.extend(evaluate_points::<f64>(&registry, &graph, batch));
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    let mut invalid = 0usize;
    let mut best: Option<(f64, &ParameterPoint)> = None;
    for (point, result) in points.iter().zip(&results) {
        match result {
            Ok(value) => {
                if best.map(|(b, _)| *value > b).unwrap_or(true) {
                    best = Some((*value, point));
                }
            }
            Err(err) => {
                tracing::debug!(point = %point, error = %err, "point discarded");
                invalid += 1;
            }
        }
    }

    println!(
        "scanned {} points under `{}`: {} valid, {} invalid",
        points.len(),
        config.request.model,
        points.len() - invalid,
        invalid
    );
    if let Some((value, point)) = best {
        println!("best {} = {:.6} at {}", config.request.capability, value, point);
    }

    Ok(())
}
