//! Backend function entries and typed handles.
//!
//! A backend exports functions under interned symbols. Each entry carries
//! a `Signature` derived from the argument tuple and return type; binding
//! a requirement to an entry compares signatures, and consumers retrieve
//! a typed `BackendFn` handle rather than a raw pointer.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::util::InternedString;

/// The call shape of a backend function: argument tuple plus return type.
///
/// Equality and hashing consider only the underlying `TypeId`; the name is
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct Signature {
    id: TypeId,
    name: &'static str,
}

impl Signature {
    /// Signature of a function taking the tuple `Args` and returning `Ret`.
    pub fn of<Args: 'static, Ret: 'static>() -> Self {
        Signature {
            id: TypeId::of::<(Args, Ret)>(),
            name: std::any::type_name::<fn(Args) -> Ret>(),
        }
    }

    /// Display name of the signature.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.name)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A typed, shareable handle to a bound backend function.
pub struct BackendFn<Args, Ret> {
    inner: Arc<dyn Fn(Args) -> Ret + Send + Sync>,
}

impl<Args, Ret> Clone for BackendFn<Args, Ret> {
    fn clone(&self) -> Self {
        BackendFn {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Args, Ret> BackendFn<Args, Ret> {
    /// Wrap a callable.
    pub fn new(f: impl Fn(Args) -> Ret + Send + Sync + 'static) -> Self {
        BackendFn { inner: Arc::new(f) }
    }

    /// Invoke the backend function.
    pub fn call(&self, args: Args) -> Ret {
        (self.inner)(args)
    }
}

impl<Args, Ret> fmt::Debug for BackendFn<Args, Ret> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendFn(<{}>)", std::any::type_name::<fn(Args) -> Ret>())
    }
}

/// One function exported by a backend.
pub struct BackendEntry {
    backend: InternedString,
    symbol: InternedString,
    signature: Signature,
    callable: Arc<dyn Any + Send + Sync>,
}

impl BackendEntry {
    /// Register a backend function under `backend::symbol`.
    pub fn new<Args, Ret>(
        backend: impl AsRef<str>,
        symbol: impl AsRef<str>,
        f: impl Fn(Args) -> Ret + Send + Sync + 'static,
    ) -> Self
    where
        Args: 'static,
        Ret: 'static,
    {
        BackendEntry {
            backend: InternedString::new(backend),
            symbol: InternedString::new(symbol),
            signature: Signature::of::<Args, Ret>(),
            callable: Arc::new(BackendFn::new(f)),
        }
    }

    /// Owning backend name.
    pub fn backend(&self) -> InternedString {
        self.backend
    }

    /// Exported symbol name.
    pub fn symbol(&self) -> InternedString {
        self.symbol
    }

    /// Declared call signature.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Qualified `backend::symbol` name for diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.backend, self.symbol)
    }

    /// Retrieve the typed handle. Fails when the requested shape does not
    /// match the registered one.
    pub fn typed<Args, Ret>(&self) -> Option<BackendFn<Args, Ret>>
    where
        Args: 'static,
        Ret: 'static,
    {
        self.callable
            .downcast_ref::<BackendFn<Args, Ret>>()
            .cloned()
    }
}

impl fmt::Debug for BackendEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendEntry")
            .field("backend", &self.backend)
            .field("symbol", &self.symbol)
            .field("signature", &self.signature)
            .finish()
    }
}
