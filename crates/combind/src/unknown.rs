//! The root interface protocol.
//!
//! Every interface extends [`IUnknown`], whose slots 0, 1 and 2 are the identity query,
//! acquire and release entries. An [`Object`] is one instance bound to one interface
//! table: construction attaches a handle and binds the proxies, calls go through those
//! proxies, and `query_interface` produces an independent instance for another interface
//! of the same foreign object.
//!
//! ```text
//! Unbound --(construct / adopt handle)--> Bound --(release)--> Released
//! ```
//!
//! An instance whose construction never attached a handle stays `Unbound` for good, and
//! every call on it fails with an unbound-method error instead of touching a null object.

use std::{cell::Cell, ffi::c_void, fmt, marker::PhantomData, ops, ptr::NonNull, rc::Rc, sync::Arc};

use crate::{
    activation::Activator,
    config::BindOptions,
    descriptor::{DescriptorCell, Interface, InterfaceBuilder, InterfaceTable, MethodDescriptor},
    error::{
        ComError, DeclarationError, ForeignCallError, InterfaceNotSupportedError, UnboundMethodError, UnboundReason,
    },
    guid::Guid,
    handle::{ComPtr, slots},
    hresult::HResult,
    proxy::{self, BoundMethod, BoundProxySet, Returned},
    registry,
    repr::{Arg, Repr, ReturnKind, one_of},
    tracer::CallTracer,
};

/// The universal base interface.
#[derive(Debug)]
pub struct IUnknown;

impl Interface for IUnknown {
    const NAME: &'static str = "IUnknown";
    const IID: Guid = Guid::from_u128(0x00000000_0000_0000_C000_000000000046);

    fn declare() -> InterfaceBuilder {
        InterfaceBuilder::for_interface::<Self>()
            .method(
                MethodDescriptor::new("QueryInterface", slots::QUERY_INTERFACE)
                    .param(Repr::Guid)
                    .param(one_of([Repr::OutPtr, Repr::Ptr])),
            )
            .method(MethodDescriptor::new("AddRef", slots::ADD_REF).returns(ReturnKind::ULong))
            .method(MethodDescriptor::new("Release", slots::RELEASE).returns(ReturnKind::ULong))
    }

    fn descriptor_cell() -> &'static DescriptorCell {
        static CELL: DescriptorCell = DescriptorCell::new();
        &CELL
    }
}

/// Lifecycle state of an [`Object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Bound,
    Released,
}

#[derive(Debug)]
enum Binding {
    Unbound,
    Bound {
        handle: ComPtr,
        proxies: BoundProxySet,
        /// References taken through the `AddRef` proxy and not yet given back.
        extra_refs: Cell<u32>,
    },
    Released,
}

/// One instance of an interface, bound to a foreign object.
///
/// The instance owns exactly one counted reference while bound; dropping it or calling
/// [`release_reference`](Self::release_reference) gives that reference back exactly once.
#[derive(Debug)]
pub struct Object {
    table: Arc<InterfaceTable>,
    binding: Binding,
    options: BindOptions,
}

impl Object {
    /// An instance that skipped construction. It never binds.
    #[must_use]
    pub fn unbound(table: Arc<InterfaceTable>) -> Self {
        Self::unbound_with(table, &BindOptions::default())
    }

    #[must_use]
    pub fn unbound_with(table: Arc<InterfaceTable>, options: &BindOptions) -> Self {
        Self {
            table,
            binding: Binding::Unbound,
            options: options.clone(),
        }
    }

    /// Activates a new foreign object of the table's class and binds to it.
    ///
    /// The new object's single reference is owned by the returned instance.
    pub fn create(
        table: Arc<InterfaceTable>,
        activator: &dyn Activator,
        options: &BindOptions,
    ) -> Result<Self, ComError> {
        let clsid = table.class_id().ok_or_else(|| DeclarationError::MissingClassIdentity {
            interface: table.name().to_owned(),
        })?;
        options.tracer_handle().on_activate(table.name(), &clsid);
        let raw = activator.activate(&clsid, &table.iid()).map_err(|status| ForeignCallError {
            interface: table.name().to_owned(),
            method: "activate".to_owned(),
            status,
        })?;
        // SAFETY: activators hand over one counted reference to an object implementing
        // the requested interface.
        let handle = unsafe { ComPtr::from_raw(raw) };
        // SAFETY: as above.
        Ok(unsafe { Self::from_handle(table, handle, options) })
    }

    /// Adopts an existing handle and binds to it without activation.
    ///
    /// # Safety
    /// The object behind `handle` must implement the interface described by `table`, with
    /// every slot of the table present in its vtable.
    #[must_use]
    pub unsafe fn from_handle(table: Arc<InterfaceTable>, handle: ComPtr, options: &BindOptions) -> Self {
        let proxies = proxy::bind(&handle, &table, options.tracer_handle());
        Self {
            table,
            binding: Binding::Bound {
                handle,
                proxies,
                extra_refs: Cell::new(0),
            },
            options: options.clone(),
        }
    }

    #[must_use]
    pub fn state(&self) -> BindState {
        match self.binding {
            Binding::Unbound => BindState::Unbound,
            Binding::Bound { .. } => BindState::Bound,
            Binding::Released => BindState::Released,
        }
    }

    /// The interface table this instance was built for.
    #[must_use]
    pub fn interface(&self) -> &Arc<InterfaceTable> {
        &self.table
    }

    /// Whether the instance holds a live object pointer.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        matches!(self.binding, Binding::Bound { .. })
    }

    /// The owned handle while bound.
    #[must_use]
    pub fn handle(&self) -> Option<&ComPtr> {
        match &self.binding {
            Binding::Bound { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// The foreign object pointer while bound.
    #[must_use]
    pub fn as_raw(&self) -> Option<NonNull<c_void>> {
        self.handle().map(ComPtr::as_raw)
    }

    /// The bound proxy set while bound.
    #[must_use]
    pub fn proxies(&self) -> Option<&BoundProxySet> {
        match &self.binding {
            Binding::Bound { proxies, .. } => Some(proxies),
            _ => None,
        }
    }

    /// Looks up the bound method called `name`.
    pub fn method(&self, name: &str) -> Result<&BoundMethod, ComError> {
        let reason = if self.table.is_stub(name) {
            UnboundReason::Stub
        } else if self.table.lookup(name).is_none() {
            UnboundReason::NotDeclared
        } else {
            match &self.binding {
                Binding::Bound { proxies, .. } => {
                    if let Some(method) = proxies.get(name) {
                        return Ok(method);
                    }
                    UnboundReason::NotDeclared
                }
                Binding::Unbound => UnboundReason::NotBound,
                Binding::Released => UnboundReason::Released,
            }
        };
        Err(self.unbound_error(name, reason).into())
    }

    /// Calls the method `name` with `args`.
    ///
    /// The root counting slots keep the handle invariant: an `AddRef` taken through this
    /// call is remembered and given back when the instance releases, and a `Release` with
    /// no such outstanding reference releases the instance itself.
    pub fn call(&mut self, name: &str, args: &mut [Arg<'_>]) -> Result<Returned, ComError> {
        let method = self.method(name)?;
        if method.declared_by() == IUnknown::IID && method.index() == slots::RELEASE && args.is_empty() {
            return self.release_through_proxy(name);
        }
        let is_add_ref = method.declared_by() == IUnknown::IID && method.index() == slots::ADD_REF;
        let returned = method.invoke(args)?;
        if is_add_ref && let Binding::Bound { extra_refs, .. } = &self.binding {
            extra_refs.set(extra_refs.get() + 1);
        }
        Ok(returned)
    }

    fn release_through_proxy(&mut self, name: &str) -> Result<Returned, ComError> {
        if let Binding::Bound { proxies, extra_refs, .. } = &self.binding
            && extra_refs.get() > 0
        {
            let method = proxies
                .get(name)
                .ok_or_else(|| self.unbound_error(name, UnboundReason::NotDeclared))?;
            let returned = method.invoke(&mut [])?;
            extra_refs.set(extra_refs.get() - 1);
            return Ok(returned);
        }
        let count = self.release_reference().unwrap_or(0);
        Ok(Returned::Count(count))
    }

    /// Acquires a new counted reference through slot 1.
    ///
    /// The returned handle is independent of the instance and releases on drop.
    pub fn acquire_reference(&self) -> Result<ComPtr, ComError> {
        let handle = self.bound_handle("AddRef")?;
        let (acquired, count) = handle.acquire();
        self.tracer().on_acquire(self.table.name(), count);
        Ok(acquired)
    }

    /// Gives back the instance's reference through slot 2 and moves to `Released`.
    ///
    /// Returns the count the object reported, or `None` if there was nothing to release
    /// (never bound, or already released). Repeated calls never release twice.
    pub fn release_reference(&mut self) -> Option<u32> {
        match std::mem::replace(&mut self.binding, Binding::Released) {
            Binding::Bound {
                handle,
                proxies,
                extra_refs,
            } => {
                drop(proxies);
                for _ in 0..extra_refs.get() {
                    // each outstanding proxy AddRef owns one unit of its own
                    // SAFETY: the object is alive while `handle` is.
                    let extra = unsafe { ComPtr::from_raw(handle.as_raw()) };
                    let count = extra.release();
                    self.tracer().on_release(self.table.name(), count);
                }
                let count = handle.release();
                self.tracer().on_release(self.table.name(), count);
                Some(count)
            }
            Binding::Unbound => {
                self.binding = Binding::Unbound;
                None
            }
            Binding::Released => None,
        }
    }

    /// Asks the foreign object for the interface named `target` through slot 0.
    ///
    /// The target must be registered. On success the returned instance owns a new
    /// reference of its own; on failure the source's count is unchanged.
    pub fn query_interface(&self, target: &Guid) -> Result<Self, ComError> {
        let handle = self.bound_handle("QueryInterface")?;
        let table = registry::lookup(target).ok_or(DeclarationError::UnregisteredIdentity { iid: *target })?;
        self.query_table(handle, table)
    }

    fn query_table(&self, handle: &ComPtr, table: Arc<InterfaceTable>) -> Result<Self, ComError> {
        let target = table.iid();
        match handle.query_interface(&target) {
            Ok(cast) => {
                self.tracer().on_query_interface(self.table.name(), &target, true);
                // SAFETY: the object just confirmed it implements `target`.
                Ok(unsafe { Self::from_handle(table, cast, &self.options) })
            }
            Err(status) => {
                self.tracer().on_query_interface(self.table.name(), &target, false);
                if status == HResult::E_NOINTERFACE {
                    Err(InterfaceNotSupportedError {
                        interface: self.table.name().to_owned(),
                        target,
                        status,
                    }
                    .into())
                } else {
                    self.tracer().on_failure(self.table.name(), "QueryInterface", status);
                    Err(ForeignCallError {
                        interface: self.table.name().to_owned(),
                        method: "QueryInterface".to_owned(),
                        status,
                    }
                    .into())
                }
            }
        }
    }

    fn bound_handle(&self, method: &str) -> Result<&ComPtr, UnboundMethodError> {
        match &self.binding {
            Binding::Bound { handle, .. } => Ok(handle),
            Binding::Unbound => Err(self.unbound_error(method, UnboundReason::NotBound)),
            Binding::Released => Err(self.unbound_error(method, UnboundReason::Released)),
        }
    }

    fn unbound_error(&self, method: &str, reason: UnboundReason) -> UnboundMethodError {
        UnboundMethodError {
            interface: self.table.name().to_owned(),
            method: method.to_owned(),
            reason,
        }
    }

    fn tracer(&self) -> &Rc<dyn CallTracer> {
        self.options.tracer_handle()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.release_reference();
    }
}

/// Typed view of an [`Object`] bound to interface `I`.
///
/// Dereferences to the untyped instance for calls and reference management.
pub struct ComObject<I: Interface> {
    object: Object,
    _interface: PhantomData<fn() -> I>,
}

impl<I: Interface> ComObject<I> {
    /// Activates a new object of `I`'s class with default options.
    pub fn create(activator: &dyn Activator) -> Result<Self, ComError> {
        Self::create_with(activator, &BindOptions::default())
    }

    pub fn create_with(activator: &dyn Activator, options: &BindOptions) -> Result<Self, ComError> {
        Ok(Self::wrap(Object::create(I::table()?, activator, options)?))
    }

    /// Adopts an existing handle.
    ///
    /// # Safety
    /// The object behind `handle` must implement `I`.
    pub unsafe fn from_handle(handle: ComPtr) -> Result<Self, ComError> {
        // SAFETY: forwarded from the caller.
        unsafe { Self::from_handle_with(handle, &BindOptions::default()) }
    }

    /// Adopts an existing handle with explicit options.
    ///
    /// # Safety
    /// The object behind `handle` must implement `I`.
    pub unsafe fn from_handle_with(handle: ComPtr, options: &BindOptions) -> Result<Self, ComError> {
        let table = I::table()?;
        // SAFETY: forwarded from the caller.
        Ok(Self::wrap(unsafe { Object::from_handle(table, handle, options) }))
    }

    /// An instance whose construction never bound a handle.
    pub fn unbound() -> Result<Self, ComError> {
        Ok(Self::wrap(Object::unbound(I::table()?)))
    }

    /// Capability cast to interface `J`, declaring `J` first if needed.
    pub fn cast<J: Interface>(&self) -> Result<ComObject<J>, ComError> {
        let handle = self.object.bound_handle("QueryInterface")?;
        let table = J::table()?;
        Ok(ComObject::wrap(self.object.query_table(handle, table)?))
    }

    #[must_use]
    pub fn into_object(self) -> Object {
        self.object
    }

    fn wrap(object: Object) -> Self {
        Self {
            object,
            _interface: PhantomData,
        }
    }
}

impl<I: Interface> fmt::Debug for ComObject<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComObject").field(&self.object).finish()
    }
}

impl<I: Interface> ops::Deref for ComObject<I> {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl<I: Interface> ops::DerefMut for ComObject<I> {
    fn deref_mut(&mut self) -> &mut Object {
        &mut self.object
    }
}
