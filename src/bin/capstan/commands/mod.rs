//! Command implementations.

pub mod graph;
pub mod run;

use capstan::resolver::ResolveError;
use capstan::util::diagnostic::{
    emit, AmbiguousProviderReport, BackendUnresolvedReport, NoProviderReport,
};

/// Report a resolution failure on stderr.
///
/// The common failures get the rich miette rendering; everything else
/// falls back to the plain diagnostic formatter.
pub(crate) fn report_resolution_failure(err: &ResolveError, color: bool) {
    match err {
        ResolveError::AmbiguousProvider {
            quantity,
            candidates,
            ..
        } => {
            let report = AmbiguousProviderReport {
                quantity: quantity.clone(),
                candidates: candidates.clone(),
            };
            eprintln!("{:?}", miette::Report::new(report));
        }
        ResolveError::NoProvider { quantity, chain, .. } => {
            let report = NoProviderReport {
                quantity: quantity.clone(),
                required_by: chain.first().map(|c| format!("required by `{c}`")),
            };
            eprintln!("{:?}", miette::Report::new(report));
        }
        ResolveError::BackendUnresolved {
            requirement,
            active_backends,
            ..
        } => {
            let report = BackendUnresolvedReport {
                symbol: requirement.clone(),
                active_backends: active_backends.clone(),
            };
            eprintln!("{:?}", miette::Report::new(report));
        }
        other => emit(&other.to_diagnostic(), color),
    }
}
