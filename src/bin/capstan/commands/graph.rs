//! `capstan graph` command

use anyhow::Result;

use crate::cli::GraphArgs;
use capstan::modules::example;
use capstan::util::config::ScanConfig;
use capstan::{Quantity, Resolver};

pub fn execute(args: GraphArgs, color: bool) -> Result<()> {
    let config = ScanConfig::load(&args.config)?;

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

    println!("schedule for `{}` under `{}`:", request, graph.model());
    for (i, &id) in graph.schedule().iter().enumerate() {
        let decl = registry.functor(id);
        println!("  {}. {} -> {}", i + 1, decl.qualified_name(), decl.quantity());

        for (capability, provider) in graph.deps_of(id) {
            println!(
                "       needs {} from {}",
                capability,
                registry.functor(*provider).qualified_name()
            );
        }

        for binding in graph.backend_bindings(id) {
            match binding.target {
                Some(target) => println!(
                    "       backend {} -> {}",
                    binding.symbol,
                    registry.backend_fn(target).qualified_name()
                ),
                None => println!("       backend {} (unbound group member)", binding.symbol),
            }
        }

        let nest = graph.nest(id);
        if !nest.is_empty() {
            let members: Vec<String> = nest
                .iter()
                .map(|m| registry.functor(*m).qualified_name())
                .collect();
            println!("       manages: {}", members.join(", "));
        }
    }

    Ok(())
}
