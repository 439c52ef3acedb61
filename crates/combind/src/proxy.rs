//! Dynamic proxy binding.
//!
//! Binding walks an interface table once, reads the function pointer of every slot from
//! the object's vtable and stores it with the slot's parameter list. A call then only
//! marshals arguments and jumps through the stored pointer; the table is not consulted
//! again.

use std::{ffi::c_void, fmt, ptr::NonNull, rc::Rc, sync::Arc};

use indexmap::IndexMap;

use crate::{
    descriptor::{InterfaceTable, MethodEntry},
    dispatch,
    error::{ArgumentError, ComError, DeclarationError, ForeignCallError},
    guid::Guid,
    handle::ComPtr,
    hresult::HResult,
    repr::{self, Arg, Repr, ReturnKind},
    tracer::CallTracer,
};

/// Value produced by a successful foreign call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returned {
    /// A non-failure status code (`S_OK`, `S_FALSE`, ...).
    Status(HResult),
    /// A reference count or other unsigned result.
    Count(u32),
}

impl Returned {
    /// The status code, if this was a status-returning call.
    #[must_use]
    pub fn status(self) -> Option<HResult> {
        match self {
            Self::Status(status) => Some(status),
            Self::Count(_) => None,
        }
    }

    /// The count, if this was a count-returning call.
    #[must_use]
    pub fn count(self) -> Option<u32> {
        match self {
            Self::Status(_) => None,
            Self::Count(count) => Some(count),
        }
    }
}

/// One method of one instance, bound to its vtable slot.
///
/// Bound methods are inspected through [`Object::method`](crate::Object::method) and
/// invoked only through [`Object::call`](crate::Object::call), which keeps the instance's
/// reference count consistent when the root counting slots are called by name:
///
/// ```compile_fail,E0624
/// fn release_directly(method: &combind::BoundMethod) {
///     let _ = method.invoke(&mut []);
/// }
/// ```
pub struct BoundMethod {
    interface: Arc<str>,
    name: Arc<str>,
    index: usize,
    params: Arc<[Repr]>,
    returns: ReturnKind,
    declared_by: Guid,
    this: NonNull<c_void>,
    slot: *const c_void,
    tracer: Rc<dyn CallTracer>,
}

impl BoundMethod {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn params(&self) -> &[Repr] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub(crate) fn declared_by(&self) -> Guid {
        self.declared_by
    }

    /// Checks and lowers `args`, then calls the foreign slot.
    ///
    /// Argument errors are raised before the foreign object is touched. A failure status
    /// is returned verbatim as `ForeignCallError`.
    pub(crate) fn invoke(&self, args: &mut [Arg<'_>]) -> Result<Returned, ComError> {
        let marshaled = repr::marshal(&self.params, args).map_err(|kind| ArgumentError {
            interface: self.interface.to_string(),
            method: self.name.to_string(),
            kind,
        })?;
        self.tracer
            .on_call(&self.interface, &self.name, self.index, marshaled.words.len());

        // SAFETY: `slot` was read from this object's vtable at bind time and the declared
        // parameter list says how many words it takes. The instance that owns this proxy
        // keeps the object alive for as long as the proxy can be reached.
        let raw = unsafe { dispatch::call_slot(self.slot, self.this.as_ptr(), &marshaled.words) };
        let raw = raw.ok_or_else(|| DeclarationError::TooManyParameters {
            interface: self.interface.to_string(),
            method: self.name.to_string(),
            count: marshaled.words.len(),
            max: dispatch::MAX_PARAMS,
        })?;

        let returned = match self.returns {
            ReturnKind::HResult => {
                let status = HResult(raw);
                if status.is_failure() {
                    self.tracer.on_failure(&self.interface, &self.name, status);
                    return Err(ForeignCallError {
                        interface: self.interface.to_string(),
                        method: self.name.to_string(),
                        status,
                    }
                    .into());
                }
                Returned::Status(status)
            }
            ReturnKind::ULong => Returned::Count(raw as u32),
        };
        self.tracer.on_return(&self.interface, &self.name, returned);
        Ok(returned)
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("interface", &self.interface)
            .field("name", &self.name)
            .field("index", &self.index)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// Per-instance map from method name to bound method. Never shared between instances.
#[derive(Debug)]
pub struct BoundProxySet {
    methods: IndexMap<Arc<str>, BoundMethod>,
}

impl BoundProxySet {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundMethod> {
        self.methods.values()
    }
}

/// Builds one bound method per entry of `table` for the object behind `handle`.
pub(crate) fn bind(handle: &ComPtr, table: &InterfaceTable, tracer: &Rc<dyn CallTracer>) -> BoundProxySet {
    let methods = table
        .methods()
        .map(|entry| (entry.shared_name().clone(), bind_method(handle, table, entry, tracer)))
        .collect::<IndexMap<_, _>>();
    tracer.on_bind(table.name(), methods.len());
    BoundProxySet { methods }
}

fn bind_method(
    handle: &ComPtr,
    table: &InterfaceTable,
    entry: &MethodEntry,
    tracer: &Rc<dyn CallTracer>,
) -> BoundMethod {
    // SAFETY: the handle's object implements `table`, whose slots all exist in its vtable.
    let slot = unsafe { handle.slot(entry.index()) };
    BoundMethod {
        interface: table.shared_name().clone(),
        name: entry.shared_name().clone(),
        index: entry.index(),
        params: Arc::clone(entry.params()),
        returns: entry.returns(),
        declared_by: entry.declared_by(),
        this: handle.as_raw(),
        slot,
        tracer: Rc::clone(tracer),
    }
}
