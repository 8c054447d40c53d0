//! Backend requirement binding.
//!
//! Plain requirements bind to exactly one matching function among the
//! active backends. Grouped requirements resolve together: exactly one
//! active backend may provide any member of the group, and selecting
//! that backend fixes which member is actually bound; the remaining
//! members stay deliberately unbound.

use std::collections::HashSet;

use crate::core::{BackendReqSpec, FunctorId, Registry};
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::BackendBinding;
use crate::resolver::resolve::Rules;
use crate::util::InternedString;

/// Bind every backend requirement of one functor.
///
/// The returned bindings are aligned with the declaration order of the
/// functor's requirements.
pub(crate) fn bind_backends(
    registry: &Registry,
    functor: FunctorId,
    active_backends: &HashSet<InternedString>,
    rules: &Rules,
    chain: &[String],
) -> Result<Vec<BackendBinding>, ResolveError> {
    let decl = registry.functor(functor);
    let reqs = decl.backend_reqs();
    let mut bindings: Vec<Option<BackendBinding>> = vec![None; reqs.len()];

    // Plain requirements bind independently.
    for (i, req) in reqs.iter().enumerate() {
        if req.group.is_some() {
            continue;
        }
        let candidates = candidates_for(registry, req, active_backends, rules);
        match candidates.len() {
            0 => {
                return Err(ResolveError::BackendUnresolved {
                    functor: decl.qualified_name(),
                    requirement: req.symbol.to_string(),
                    active_backends: sorted_names(active_backends),
                    chain: chain.to_vec(),
                })
            }
            1 => {
                bindings[i] = Some(BackendBinding {
                    symbol: req.symbol,
                    group: None,
                    target: Some(candidates[0]),
                });
            }
            _ => {
                return Err(ResolveError::AmbiguousBackend {
                    functor: decl.qualified_name(),
                    requirement: req.symbol.to_string(),
                    candidates: candidates
                        .iter()
                        .map(|id| registry.backend_fn(*id).qualified_name())
                        .collect(),
                    chain: chain.to_vec(),
                })
            }
        }
    }

    // Grouped requirements resolve per group.
    let mut groups: Vec<InternedString> = Vec::new();
    for req in reqs {
        if let Some(g) = req.group {
            if !groups.contains(&g) {
                groups.push(g);
            }
        }
    }

    for group in groups {
        let members: Vec<usize> = reqs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.group == Some(group))
            .map(|(i, _)| i)
            .collect();

        // Which active backends provide any member of this group?
        let mut providing: Vec<InternedString> = Vec::new();
        for &i in &members {
            for id in candidates_for(registry, &reqs[i], active_backends, rules) {
                let backend = registry.backend_fn(id).backend();
                if !providing.contains(&backend) {
                    providing.push(backend);
                }
            }
        }

        if let Some(pin) = rules.backend_pin(group) {
            providing.retain(|b| *b == pin);
        }

        let selected = match providing.len() {
            0 => {
                return Err(ResolveError::BackendUnresolved {
                    functor: decl.qualified_name(),
                    requirement: group.to_string(),
                    active_backends: sorted_names(active_backends),
                    chain: chain.to_vec(),
                })
            }
            1 => providing[0],
            _ => {
                return Err(ResolveError::AmbiguousBackend {
                    functor: decl.qualified_name(),
                    requirement: group.to_string(),
                    candidates: providing.iter().map(|b| b.to_string()).collect(),
                    chain: chain.to_vec(),
                })
            }
        };

        // The selected backend fixes which member binds; it must fix
        // exactly one.
        let mut bound: Vec<(usize, crate::core::BackendFnId)> = Vec::new();
        for &i in &members {
            for id in candidates_for(registry, &reqs[i], active_backends, rules) {
                if registry.backend_fn(id).backend() == selected {
                    bound.push((i, id));
                }
            }
        }

        if bound.len() > 1 {
            return Err(ResolveError::AmbiguousBackend {
                functor: decl.qualified_name(),
                requirement: group.to_string(),
                candidates: bound
                    .iter()
                    .map(|(_, id)| registry.backend_fn(*id).qualified_name())
                    .collect(),
                chain: chain.to_vec(),
            });
        }

        for &i in &members {
            let target = bound
                .iter()
                .find(|(j, _)| *j == i)
                .map(|(_, id)| *id);
            bindings[i] = Some(BackendBinding {
                symbol: reqs[i].symbol,
                group: Some(group),
                target,
            });
        }
    }

    Ok(bindings.into_iter().map(|b| b.expect("requirement bound")).collect())
}

/// Active-backend candidates for one requirement, honoring the
/// requirement's allowed-backend restriction and any backend pin.
fn candidates_for(
    registry: &Registry,
    req: &BackendReqSpec,
    active_backends: &HashSet<InternedString>,
    rules: &Rules,
) -> Vec<crate::core::BackendFnId> {
    let mut candidates: Vec<_> = registry
        .backend_candidates(req.symbol, req.signature)
        .into_iter()
        .filter(|id| {
            let backend = registry.backend_fn(*id).backend();
            active_backends.contains(&backend)
                && (req.allowed_backends.is_empty() || req.allowed_backends.contains(&backend))
        })
        .collect();

    // A pin on the symbol narrows plain requirements; group pins are
    // applied at group level.
    if req.group.is_none() {
        if let Some(pin) = rules.backend_pin(req.symbol) {
            candidates.retain(|id| registry.backend_fn(*id).backend() == pin);
        }
    }

    candidates
}

fn sorted_names(backends: &HashSet<InternedString>) -> Vec<String> {
    let mut names: Vec<String> = backends.iter().map(|b| b.to_string()).collect();
    names.sort();
    names
}
