//! Loop-manager binding.
//!
//! A managed functor never runs standalone: it binds to exactly one
//! can-manage provider of its loop capability, which invokes it once per
//! inner iteration. Candidate managers are filtered like any other
//! provider (model applicability, pins); anything other than a single
//! survivor is a `NoUniqueLoopManager` failure. A manager that is itself
//! managed binds one level up, so nested loops chain through here too.

use crate::core::{Capability, FunctorId, ModelHierarchy, Registry};
use crate::resolver::resolve::Rules;
use crate::util::InternedString;

/// Eligible managers for a loop capability, in registration order.
pub(crate) fn manager_candidates(
    registry: &Registry,
    models: &ModelHierarchy,
    active_model: InternedString,
    loop_capability: Capability,
    rules: &Rules,
) -> Vec<FunctorId> {
    let mut candidates: Vec<FunctorId> = registry
        .providers_of_capability(loop_capability)
        .iter()
        .copied()
        .filter(|id| {
            let decl = registry.functor(*id);
            decl.manages_loops() && decl.accepts_model(models, active_model)
        })
        .collect();

    if let Some(pin) = rules.provider_pin(loop_capability) {
        candidates.retain(|id| rules.matches_pin(registry.functor(*id), pin));
    }

    candidates
}
