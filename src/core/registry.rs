//! The functor and backend-function registry.
//!
//! All declarations are collected by a `RegistryBuilder` during an
//! explicit startup pass, then frozen into a read-only `Registry` before
//! any resolution happens. Registration order fixes the deterministic
//! tie-break order used by the resolver, so graphs are reproducible
//! across runs with identical configuration.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::backend::{BackendEntry, Signature};
use crate::core::capability::{Capability, Quantity};
use crate::core::declaration::FunctorDecl;
use crate::util::InternedString;

/// Registration error. Fatal: the registry is mis-declared.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("functor `{module}::{function}` is already registered")]
    DuplicateFunctor {
        module: InternedString,
        function: InternedString,
    },

    #[error("backend function `{backend}::{symbol}` is already registered")]
    DuplicateBackendFunction {
        backend: InternedString,
        symbol: InternedString,
    },
}

/// Handle to a registered functor. Ordering follows registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctorId(u32);

impl FunctorId {
    /// Position in registration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a registered backend function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendFnId(u32);

impl BackendFnId {
    /// Position in registration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Collects declarations during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    functors: Vec<FunctorDecl>,
    functor_names: HashMap<(InternedString, InternedString), FunctorId>,
    backend_fns: Vec<BackendEntry>,
    backend_names: HashMap<(InternedString, InternedString), BackendFnId>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Register a functor declaration.
    pub fn declare(&mut self, decl: FunctorDecl) -> Result<FunctorId, RegistryError> {
        let key = (decl.module(), decl.function());
        if self.functor_names.contains_key(&key) {
            return Err(RegistryError::DuplicateFunctor {
                module: key.0,
                function: key.1,
            });
        }
        let id = FunctorId(self.functors.len() as u32);
        self.functor_names.insert(key, id);
        self.functors.push(decl);
        Ok(id)
    }

    /// Register a backend function entry.
    pub fn declare_backend_fn(&mut self, entry: BackendEntry) -> Result<BackendFnId, RegistryError> {
        let key = (entry.backend(), entry.symbol());
        if self.backend_names.contains_key(&key) {
            return Err(RegistryError::DuplicateBackendFunction {
                backend: key.0,
                symbol: key.1,
            });
        }
        let id = BackendFnId(self.backend_fns.len() as u32);
        self.backend_names.insert(key, id);
        self.backend_fns.push(entry);
        Ok(id)
    }

    /// Freeze the builder into a read-only registry.
    pub fn build(self) -> Registry {
        let mut providers: HashMap<Capability, Vec<FunctorId>> = HashMap::new();
        for (i, decl) in self.functors.iter().enumerate() {
            providers
                .entry(decl.capability())
                .or_default()
                .push(FunctorId(i as u32));
        }

        let mut symbols: HashMap<InternedString, Vec<BackendFnId>> = HashMap::new();
        for (i, entry) in self.backend_fns.iter().enumerate() {
            symbols
                .entry(entry.symbol())
                .or_default()
                .push(BackendFnId(i as u32));
        }

        Registry {
            functors: self.functors,
            functor_names: self.functor_names,
            backend_fns: self.backend_fns,
            providers,
            symbols,
        }
    }
}

/// The frozen catalogue of declared functors and backend functions.
///
/// Read-only after startup; shared freely across threads during scanning.
#[derive(Debug)]
pub struct Registry {
    functors: Vec<FunctorDecl>,
    functor_names: HashMap<(InternedString, InternedString), FunctorId>,
    backend_fns: Vec<BackendEntry>,
    providers: HashMap<Capability, Vec<FunctorId>>,
    symbols: HashMap<InternedString, Vec<BackendFnId>>,
}

impl Registry {
    /// Look up a functor declaration.
    pub fn functor(&self, id: FunctorId) -> &FunctorDecl {
        &self.functors[id.index()]
    }

    /// Iterate over all functors in registration order.
    pub fn functors(&self) -> impl Iterator<Item = (FunctorId, &FunctorDecl)> {
        self.functors
            .iter()
            .enumerate()
            .map(|(i, d)| (FunctorId(i as u32), d))
    }

    /// Look up a functor by `module` and `function` name.
    pub fn functor_by_name(&self, module: &str, function: &str) -> Option<FunctorId> {
        self.functor_names
            .get(&(InternedString::new(module), InternedString::new(function)))
            .copied()
    }

    /// Providers of a capability, any result type, in registration order.
    pub fn providers_of_capability(&self, capability: Capability) -> &[FunctorId] {
        self.providers
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Providers matching a demanded quantity exactly, in registration
    /// order.
    pub fn providers(&self, quantity: Quantity) -> Vec<FunctorId> {
        self.providers_of_capability(quantity.capability)
            .iter()
            .copied()
            .filter(|id| self.functor(*id).result() == quantity.type_tag)
            .collect()
    }

    /// Look up a backend function entry.
    pub fn backend_fn(&self, id: BackendFnId) -> &BackendEntry {
        &self.backend_fns[id.index()]
    }

    /// Backend functions exporting a symbol with a matching signature, in
    /// registration order.
    pub fn backend_candidates(&self, symbol: InternedString, signature: Signature) -> Vec<BackendFnId> {
        self.symbols
            .get(&symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|id| self.backend_fn(*id).signature() == signature)
            .collect()
    }

    /// Number of registered functors.
    pub fn len(&self) -> usize {
        self.functors.len()
    }

    /// Check if no functors are registered.
    pub fn is_empty(&self) -> bool {
        self.functors.is_empty()
    }
}
