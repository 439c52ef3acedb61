//! Process-wide interface registry.
//!
//! Maps interface identities to their built tables so a capability cast can find the
//! table for an identity known only at runtime. Tables are added as interface types are
//! declared, never removed or replaced, and the map is read-only in practice once the
//! program has declared its interfaces. There is no teardown.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use ahash::AHashMap;

use crate::{
    descriptor::{Interface, InterfaceTable},
    error::DeclarationError,
    guid::Guid,
    unknown::IUnknown,
};

type Registry = RwLock<AHashMap<Guid, Arc<InterfaceTable>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::default)
}

/// Adds `table` under its identity.
///
/// Fails if another table already holds that identity.
pub fn register(table: InterfaceTable) -> Result<Arc<InterfaceTable>, DeclarationError> {
    let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = map.get(&table.iid()) {
        return Err(DeclarationError::DuplicateIdentity {
            iid: table.iid(),
            existing: existing.name().to_owned(),
            interface: table.name().to_owned(),
        });
    }
    let table = Arc::new(table);
    map.insert(table.iid(), Arc::clone(&table));
    Ok(table)
}

/// Finds the table registered for `iid`.
///
/// The root interface always resolves, even before any typed use of it.
#[must_use]
pub fn lookup(iid: &Guid) -> Option<Arc<InterfaceTable>> {
    if *iid == IUnknown::IID {
        return IUnknown::table().ok();
    }
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(iid)
        .cloned()
}

/// Whether a table is registered for `iid`.
#[must_use]
pub fn contains(iid: &Guid) -> bool {
    lookup(iid).is_some()
}

/// Identities registered so far, in no particular order.
#[must_use]
pub fn identities() -> Vec<Guid> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .copied()
        .collect()
}
