//! Textual interface declarations.
//!
//! A manifest describes one interface as data, with methods keyed by name:
//!
//! ```json
//! {
//!   "name": "ITaskbarList",
//!   "iid": "{56FDF342-FD6D-11D0-958A-006097C9A090}",
//!   "clsid": "{56FDF344-FD6D-11D0-958A-006097C9A090}",
//!   "methods": {
//!     "HrInit":     { "index": 3 },
//!     "AddTab":     { "index": 4, "args": { "hwnd": "HWND" } },
//!     "SetPath":    { "index": 5, "args": [["LPCWSTR", "PTR"]] }
//!   }
//! }
//! ```
//!
//! `args` is either a list or a name → type map (names are documentation only). A type is
//! one representation name or a list of names, of which the first is used. `extends`
//! defaults to the root interface and lists ancestor identities that must already be
//! registered.
//!
//! A method whose name is already declared by an ancestor replaces the ancestor's entry
//! for lookups by name. This is not an error and nothing is logged; the replaced names are
//! listed by [`InterfaceTable::overrides`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    descriptor::{Interface, InterfaceBuilder, InterfaceTable, MethodDescriptor},
    error::DeclarationError,
    guid::Guid,
    repr::{ReturnKind, TypeHint},
    unknown::IUnknown,
};

/// Serialisable declaration of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceManifest {
    pub name: String,
    pub iid: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clsid: Option<Guid>,
    #[serde(default = "root_ancestry")]
    pub extends: Vec<Guid>,
    #[serde(default)]
    pub methods: IndexMap<String, MethodManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stubs: Vec<String>,
}

fn root_ancestry() -> Vec<Guid> {
    vec![IUnknown::IID]
}

/// One method entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodManifest {
    pub index: usize,
    #[serde(default, skip_serializing_if = "ArgsManifest::is_empty")]
    pub args: ArgsManifest,
    #[serde(default, skip_serializing_if = "is_default_return")]
    pub returns: ReturnKind,
}

fn is_default_return(kind: &ReturnKind) -> bool {
    *kind == ReturnKind::default()
}

/// Parameter list, positional or keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgsManifest {
    Positional(Vec<TypeHint>),
    Named(IndexMap<String, TypeHint>),
}

impl ArgsManifest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(hints) => hints.is_empty(),
            Self::Named(hints) => hints.is_empty(),
        }
    }

    fn hints(&self) -> Vec<TypeHint> {
        match self {
            Self::Positional(hints) => hints.clone(),
            Self::Named(hints) => hints.values().cloned().collect(),
        }
    }
}

impl Default for ArgsManifest {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl InterfaceManifest {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Describes the own methods and direct ancestors of an existing table.
    #[must_use]
    pub fn from_table(table: &InterfaceTable) -> Self {
        let methods = table
            .declared_methods()
            .iter()
            .map(|method| {
                let entry = MethodManifest {
                    index: method.index(),
                    args: ArgsManifest::Positional(method.type_hints().to_vec()),
                    returns: method.return_kind(),
                };
                (method.name().to_owned(), entry)
            })
            .collect();
        Self {
            name: table.name().to_owned(),
            iid: table.iid(),
            clsid: table.class_id(),
            extends: table.ancestors().iter().map(|ancestor| ancestor.iid()).collect(),
            methods,
            stubs: table.own_stubs().map(str::to_owned).collect(),
        }
    }

    /// Turns the manifest into a builder, resolving ancestors through the registry.
    #[must_use]
    pub fn builder(&self) -> InterfaceBuilder {
        let mut builder = InterfaceBuilder::new(&self.name, self.iid);
        if let Some(clsid) = self.clsid {
            builder = builder.class_id(clsid);
        }
        for ancestor in &self.extends {
            builder = builder.extends_identity(ancestor);
        }
        for (name, method) in &self.methods {
            let descriptor = MethodDescriptor::new(name, method.index)
                .params(method.args.hints())
                .returns(method.returns);
            builder = builder.method(descriptor);
        }
        for stub in &self.stubs {
            builder = builder.stub(stub);
        }
        builder
    }

    /// Builds and registers the interface.
    pub fn declare(&self) -> Result<Arc<InterfaceTable>, DeclarationError> {
        self.builder().register()
    }
}
