//! Method descriptors and interface descriptor tables.
//!
//! An interface is declared once, as inert data: its identity, its ancestors and the
//! [`MethodDescriptor`]s of the slots it adds. [`InterfaceBuilder::build`] validates the
//! declaration and flattens it with the ancestor tables into an immutable
//! [`InterfaceTable`]; nothing is resolved lazily at call time.
//!
//! ```
//! use combind::{Guid, IUnknown, InterfaceBuilder, MethodDescriptor, Repr};
//!
//! let table = InterfaceBuilder::new("IExample", Guid::from_u128(0x3f1c_0d52_0000_4000_8000_0000_0000_0001))
//!     .extends::<IUnknown>()
//!     .method(MethodDescriptor::new("Load", 5).param(Repr::WideStr).param(Repr::UInt))
//!     .build()
//!     .unwrap();
//! assert_eq!(table.lookup("Load").unwrap().index(), 5);
//! assert_eq!(table.lookup("Release").unwrap().index(), 2);
//! ```

use std::sync::{Arc, OnceLock};

use indexmap::{IndexMap, IndexSet};

use crate::{
    dispatch::MAX_PARAMS,
    error::DeclarationError,
    guid::Guid,
    registry,
    repr::{Repr, ReturnKind, TypeHint},
};

/// Declaration-time record of one method: its slot index and parameter types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    index: usize,
    params: Vec<TypeHint>,
    returns: ReturnKind,
}

impl MethodDescriptor {
    /// A method at vtable slot `index` with no parameters returning a status code.
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            params: Vec::new(),
            returns: ReturnKind::HResult,
        }
    }

    /// Appends one parameter.
    #[must_use]
    pub fn param(mut self, hint: impl Into<TypeHint>) -> Self {
        self.params.push(hint.into());
        self
    }

    /// Appends several parameters in order.
    #[must_use]
    pub fn params<H: Into<TypeHint>>(mut self, hints: impl IntoIterator<Item = H>) -> Self {
        self.params.extend(hints.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn returns(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Parameter types as declared, choices included.
    #[must_use]
    pub fn type_hints(&self) -> &[TypeHint] {
        &self.params
    }

    #[must_use]
    pub fn return_kind(&self) -> ReturnKind {
        self.returns
    }
}

/// A validated method as it appears in a flattened table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    name: Arc<str>,
    index: usize,
    params: Arc<[Repr]>,
    returns: ReturnKind,
    declared_by: Guid,
}

impl MethodEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolved parameter representations.
    #[must_use]
    pub fn params(&self) -> &Arc<[Repr]> {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    /// Identity of the interface that declared this slot.
    #[must_use]
    pub fn declared_by(&self) -> Guid {
        self.declared_by
    }
}

/// Flattened, immutable description of one interface.
///
/// Owned by the interface type (through its [`DescriptorCell`]) and by the process-wide
/// registry; never mutated after it is built.
#[derive(Debug)]
pub struct InterfaceTable {
    name: Arc<str>,
    iid: Guid,
    clsid: Option<Guid>,
    ancestors: Vec<Arc<InterfaceTable>>,
    declared: Vec<MethodDescriptor>,
    own: IndexMap<Arc<str>, MethodEntry>,
    stubs: IndexSet<String>,
    overrides: Vec<Arc<str>>,
    effective: IndexMap<Arc<str>, MethodEntry>,
}

impl InterfaceTable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn iid(&self) -> Guid {
        self.iid
    }

    #[must_use]
    pub fn class_id(&self) -> Option<Guid> {
        self.clsid
    }

    /// Direct ancestors in declaration order.
    #[must_use]
    pub fn ancestors(&self) -> &[Arc<Self>] {
        &self.ancestors
    }

    /// Finds a method: own entries first, then each ancestor in declaration order.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&MethodEntry> {
        self.effective.get(name)
    }

    /// Every method reachable from this interface, ordered by slot index.
    pub fn methods(&self) -> impl ExactSizeIterator<Item = &MethodEntry> {
        self.effective.values()
    }

    /// Methods declared directly on this interface.
    pub fn own_methods(&self) -> impl ExactSizeIterator<Item = &MethodEntry> {
        self.own.values()
    }

    /// Own method descriptors exactly as declared.
    #[must_use]
    pub fn declared_methods(&self) -> &[MethodDescriptor] {
        &self.declared
    }

    /// Own methods whose name shadows a method of an ancestor, in declaration order.
    ///
    /// The own entry wins; the ancestor's slot is no longer reachable by that name.
    pub fn overrides(&self) -> impl Iterator<Item = &str> {
        self.overrides.iter().map(|name| &**name)
    }

    /// Names declared without a descriptor on this interface only.
    pub fn own_stubs(&self) -> impl Iterator<Item = &str> {
        self.stubs.iter().map(String::as_str)
    }

    /// Whether `name` is declared somewhere in the ancestry without any descriptor.
    #[must_use]
    pub fn is_stub(&self, name: &str) -> bool {
        self.lookup(name).is_none() && self.has_stub(name)
    }

    fn has_stub(&self, name: &str) -> bool {
        self.stubs.contains(name) || self.ancestors.iter().any(|ancestor| ancestor.has_stub(name))
    }

    /// One past the highest slot index in the flattened table.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.effective.values().map(|entry| entry.index + 1).max().unwrap_or(0)
    }

    /// Whether this interface is, or transitively extends, the one named by `iid`.
    #[must_use]
    pub fn derives_from(&self, iid: &Guid) -> bool {
        self.iid == *iid || self.ancestors.iter().any(|ancestor| ancestor.derives_from(iid))
    }
}

/// Collects an interface declaration and builds its [`InterfaceTable`].
///
/// Builder methods never fail; the first problem is remembered and returned by
/// [`build`](Self::build).
#[derive(Debug)]
pub struct InterfaceBuilder {
    name: String,
    iid: Guid,
    clsid: Option<Guid>,
    ancestors: Vec<Arc<InterfaceTable>>,
    methods: Vec<MethodDescriptor>,
    stubs: Vec<String>,
    error: Option<DeclarationError>,
}

impl InterfaceBuilder {
    pub fn new(name: impl Into<String>, iid: Guid) -> Self {
        Self {
            name: name.into(),
            iid,
            clsid: None,
            ancestors: Vec::new(),
            methods: Vec::new(),
            stubs: Vec::new(),
            error: None,
        }
    }

    /// Starts a declaration whose identity is given as text.
    pub fn parse(name: impl Into<String>, iid: &str) -> Self {
        let mut builder = Self::new(name, Guid::NULL);
        match Guid::parse(iid) {
            Ok(guid) => builder.iid = guid,
            Err(err) => builder.fail(DeclarationError::InvalidIdentity {
                interface: builder.name.clone(),
                text: err.text,
            }),
        }
        builder
    }

    /// Starts the declaration of a typed interface from its constants.
    #[must_use]
    pub fn for_interface<I: Interface>() -> Self {
        let mut builder = Self::new(I::NAME, I::IID);
        builder.clsid = I::CLSID;
        builder
    }

    /// Sets the class identity used when instances are activated.
    #[must_use]
    pub fn class_id(mut self, clsid: Guid) -> Self {
        self.clsid = Some(clsid);
        self
    }

    /// Sets the class identity from text.
    #[must_use]
    pub fn class_id_text(mut self, clsid: &str) -> Self {
        match Guid::parse(clsid) {
            Ok(guid) => self.clsid = Some(guid),
            Err(err) => {
                let interface = self.name.clone();
                self.fail(DeclarationError::InvalidIdentity {
                    interface,
                    text: err.text,
                });
            }
        }
        self
    }

    /// Adds a typed ancestor, building its table if that has not happened yet.
    #[must_use]
    pub fn extends<I: Interface>(self) -> Self {
        match I::table() {
            Ok(table) => self.extends_table(table),
            Err(err) => {
                let mut builder = self;
                builder.fail(err);
                builder
            }
        }
    }

    #[must_use]
    pub fn extends_table(mut self, table: Arc<InterfaceTable>) -> Self {
        self.ancestors.push(table);
        self
    }

    /// Adds an ancestor by identity, resolved through the registry.
    #[must_use]
    pub fn extends_identity(mut self, iid: &Guid) -> Self {
        match registry::lookup(iid) {
            Some(table) => self.extends_table(table),
            None => {
                self.fail(DeclarationError::UnregisteredIdentity { iid: *iid });
                self
            }
        }
    }

    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Declares a method name without a descriptor; calling it fails as unbound.
    #[must_use]
    pub fn stub(mut self, name: impl Into<String>) -> Self {
        self.stubs.push(name.into());
        self
    }

    fn fail(&mut self, error: DeclarationError) {
        self.error.get_or_insert(error);
    }

    /// Validates the declaration and flattens it with its ancestors.
    pub fn build(self) -> Result<InterfaceTable, DeclarationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let name: Arc<str> = Arc::from(self.name.as_str());

        let mut own: IndexMap<Arc<str>, MethodEntry> = IndexMap::with_capacity(self.methods.len());
        let mut slots: IndexMap<usize, &str> = IndexMap::with_capacity(self.methods.len());
        for method in &self.methods {
            if own.contains_key(method.name.as_str()) {
                return Err(DeclarationError::DuplicateMethod {
                    interface: self.name.clone(),
                    method: method.name.clone(),
                });
            }
            if let Some(first) = slots.insert(method.index, &method.name) {
                return Err(DeclarationError::DuplicateIndex {
                    interface: self.name.clone(),
                    index: method.index,
                    first: first.to_owned(),
                    second: method.name.clone(),
                });
            }
            let entry = resolve(&self.name, self.iid, method)?;
            own.insert(entry.name.clone(), entry);
        }

        let mut stubs = IndexSet::with_capacity(self.stubs.len());
        for stub in self.stubs {
            if own.contains_key(stub.as_str()) || stubs.contains(&stub) {
                return Err(DeclarationError::DuplicateMethod {
                    interface: self.name,
                    method: stub,
                });
            }
            stubs.insert(stub);
        }

        let overrides = own
            .keys()
            .filter(|name| self.ancestors.iter().any(|ancestor| ancestor.lookup(name).is_some()))
            .cloned()
            .collect();

        let mut effective = own.clone();
        for ancestor in &self.ancestors {
            for entry in ancestor.methods() {
                effective.entry(entry.name.clone()).or_insert_with(|| entry.clone());
            }
        }
        effective.sort_by(|_, a, _, b| a.index.cmp(&b.index));

        Ok(InterfaceTable {
            name,
            iid: self.iid,
            clsid: self.clsid,
            ancestors: self.ancestors,
            declared: self.methods,
            own,
            stubs,
            overrides,
            effective,
        })
    }

    /// Builds the table and adds it to the process-wide registry.
    pub fn register(self) -> Result<Arc<InterfaceTable>, DeclarationError> {
        registry::register(self.build()?)
    }
}

fn resolve(interface: &str, iid: Guid, method: &MethodDescriptor) -> Result<MethodEntry, DeclarationError> {
    if method.params.len() > MAX_PARAMS {
        return Err(DeclarationError::TooManyParameters {
            interface: interface.to_owned(),
            method: method.name.clone(),
            count: method.params.len(),
            max: MAX_PARAMS,
        });
    }
    let mut params = Vec::with_capacity(method.params.len());
    for (position, hint) in method.params.iter().enumerate() {
        let repr = hint.primary().ok_or_else(|| DeclarationError::EmptyTypeChoice {
            interface: interface.to_owned(),
            method: method.name.clone(),
            position,
        })?;
        if !repr.fits_in_word() {
            return Err(DeclarationError::UnsupportedRepr {
                interface: interface.to_owned(),
                method: method.name.clone(),
                repr,
            });
        }
        params.push(repr);
    }
    Ok(MethodEntry {
        name: Arc::from(method.name.as_str()),
        index: method.index,
        params: params.into(),
        returns: method.returns,
        declared_by: iid,
    })
}

/// A typed interface declaration.
///
/// Implementors supply constants and a declaration; the table is built and registered the
/// first time [`table`](Self::table) is called and cached for the life of the process,
/// including a failed build.
///
/// ```
/// use combind::{DescriptorCell, Guid, IUnknown, Interface, InterfaceBuilder, MethodDescriptor, Repr};
///
/// struct IPersist;
///
/// impl Interface for IPersist {
///     const NAME: &'static str = "IPersist";
///     const IID: Guid = Guid::from_u128(0x0000010c_0000_0000_C000_000000000046);
///
///     fn declare() -> InterfaceBuilder {
///         InterfaceBuilder::for_interface::<Self>()
///             .extends::<IUnknown>()
///             .method(MethodDescriptor::new("GetClassID", 3).param(Repr::Ptr))
///     }
///
///     fn descriptor_cell() -> &'static DescriptorCell {
///         static CELL: DescriptorCell = DescriptorCell::new();
///         &CELL
///     }
/// }
///
/// let table = IPersist::table().unwrap();
/// assert_eq!(table.slot_count(), 4);
/// ```
pub trait Interface: 'static {
    const NAME: &'static str;
    const IID: Guid;
    const CLSID: Option<Guid> = None;

    /// The declaration of this interface.
    fn declare() -> InterfaceBuilder;

    /// Storage for the built table; one static per implementing type.
    fn descriptor_cell() -> &'static DescriptorCell;

    /// The flattened table, built and registered on first use.
    fn table() -> Result<Arc<InterfaceTable>, DeclarationError> {
        Self::descriptor_cell().get_or_register(Self::declare)
    }
}

/// Once-per-type cache for a built (or failed) interface table.
#[derive(Debug)]
pub struct DescriptorCell(OnceLock<Result<Arc<InterfaceTable>, DeclarationError>>);

impl DescriptorCell {
    #[must_use]
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the cached result, running `declare` and registering on first use.
    pub fn get_or_register(
        &self,
        declare: impl FnOnce() -> InterfaceBuilder,
    ) -> Result<Arc<InterfaceTable>, DeclarationError> {
        self.0.get_or_init(|| declare().register()).clone()
    }
}

impl Default for DescriptorCell {
    fn default() -> Self {
        Self::new()
    }
}
