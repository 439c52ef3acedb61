//! Foreign parameter representations and argument marshaling.
//!
//! Every declared parameter resolves to one [`Repr`]. At call time each [`Arg`] is checked
//! against its representation and lowered to a single machine word, which is what the
//! dispatcher passes through the vtable slot.

use std::{ffi::c_void, ptr};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{error::ArgumentErrorKind, guid::Guid};

/// Integer-class representation of one foreign parameter.
///
/// Names follow the platform type names they stand for; aliases are accepted when parsing
/// (`"DWORD"` and `"ULONG"` both give [`Repr::UInt`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Repr {
    /// Signed 32-bit integer.
    #[strum(to_string = "INT", serialize = "LONG", serialize = "HRESULT")]
    #[serde(rename = "INT", alias = "LONG", alias = "HRESULT")]
    Int,
    /// Unsigned 32-bit integer.
    #[strum(to_string = "UINT", serialize = "DWORD", serialize = "ULONG")]
    #[serde(rename = "UINT", alias = "DWORD", alias = "ULONG")]
    UInt,
    /// Signed 64-bit integer.
    #[strum(to_string = "LONGLONG")]
    #[serde(rename = "LONGLONG")]
    LongLong,
    /// Unsigned 64-bit integer.
    #[strum(to_string = "ULONGLONG")]
    #[serde(rename = "ULONGLONG")]
    ULongLong,
    /// 32-bit boolean (`0` or `1`).
    #[strum(to_string = "BOOL")]
    #[serde(rename = "BOOL")]
    Bool,
    /// Pointer-sized opaque handle such as a window handle.
    #[strum(to_string = "HANDLE", serialize = "HWND")]
    #[serde(rename = "HANDLE", alias = "HWND")]
    Handle,
    /// Untyped pointer.
    #[strum(to_string = "PTR", serialize = "LPVOID")]
    #[serde(rename = "PTR", alias = "LPVOID")]
    Ptr,
    /// Pointer to an identity descriptor.
    #[strum(to_string = "REFIID", serialize = "REFCLSID", serialize = "REFGUID")]
    #[serde(rename = "REFIID", alias = "REFCLSID", alias = "REFGUID")]
    Guid,
    /// Out-pointer receiving a pointer.
    #[strum(to_string = "PPV", serialize = "VOID_PP")]
    #[serde(rename = "PPV", alias = "VOID_PP")]
    OutPtr,
    /// Out-pointer receiving a 32-bit unsigned value.
    #[strum(to_string = "PDWORD", serialize = "PULONG")]
    #[serde(rename = "PDWORD", alias = "PULONG")]
    OutU32,
    /// NUL-terminated UTF-16 string.
    #[strum(to_string = "LPCWSTR", serialize = "LPCOLESTR", serialize = "LPWSTR")]
    #[serde(rename = "LPCWSTR", alias = "LPCOLESTR", alias = "LPWSTR")]
    WideStr,
}

impl Repr {
    /// Whether the representation fits in one machine word on this target.
    #[must_use]
    pub const fn fits_in_word(self) -> bool {
        match self {
            Self::LongLong | Self::ULongLong => cfg!(target_pointer_width = "64"),
            _ => true,
        }
    }
}

/// A declared parameter type.
///
/// A declaration may offer several representations for one parameter. Only the first one
/// is used to build the call; the rest are never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeHint {
    Plain(Repr),
    OneOf(Vec<Repr>),
}

impl TypeHint {
    /// The representation the call is built with, `None` for an empty choice.
    #[must_use]
    pub fn primary(&self) -> Option<Repr> {
        match self {
            Self::Plain(repr) => Some(*repr),
            Self::OneOf(choices) => choices.first().copied(),
        }
    }
}

impl From<Repr> for TypeHint {
    fn from(repr: Repr) -> Self {
        Self::Plain(repr)
    }
}

/// Builds a [`TypeHint::OneOf`] from the listed representations.
pub fn one_of(choices: impl IntoIterator<Item = Repr>) -> TypeHint {
    TypeHint::OneOf(choices.into_iter().collect())
}

/// How the foreign return value is read.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum ReturnKind {
    /// Status code; failures become `ForeignCallError`.
    #[default]
    #[strum(to_string = "HRESULT")]
    #[serde(rename = "HRESULT")]
    HResult,
    /// Unsigned count returned as-is (reference counting slots).
    #[strum(to_string = "ULONG")]
    #[serde(rename = "ULONG")]
    ULong,
}

/// One call argument on the calling side.
#[derive(Debug)]
pub enum Arg<'a> {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Ptr(*mut c_void),
    Guid(&'a Guid),
    Str(&'a str),
    OutPtr(&'a mut *mut c_void),
    OutU32(&'a mut u32),
}

impl Arg<'_> {
    /// Short kind name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Bool(_) => "bool",
            Self::Ptr(_) => "pointer",
            Self::Guid(_) => "guid",
            Self::Str(_) => "str",
            Self::OutPtr(_) => "out pointer",
            Self::OutU32(_) => "out u32",
        }
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Self::UInt(value.into())
    }
}

impl From<u64> for Arg<'_> {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<bool> for Arg<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<'a> From<&'a Guid> for Arg<'a> {
    fn from(value: &'a Guid) -> Self {
        Self::Guid(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Self::Str(value)
    }
}

impl<'a> From<&'a mut *mut c_void> for Arg<'a> {
    fn from(value: &'a mut *mut c_void) -> Self {
        Self::OutPtr(value)
    }
}

impl<'a> From<&'a mut u32> for Arg<'a> {
    fn from(value: &'a mut u32) -> Self {
        Self::OutU32(value)
    }
}

/// Arguments lowered to machine words, plus the buffers those words point into.
///
/// The buffers must outlive the foreign call, so they travel with the words.
#[derive(Debug, Default)]
pub(crate) struct Marshaled {
    pub words: SmallVec<[usize; 8]>,
    strings: Vec<Vec<u16>>,
}

impl Marshaled {
    /// Number of retained string buffers.
    #[cfg(test)]
    fn buffers(&self) -> usize {
        self.strings.len()
    }
}

/// Checks arity and lowers each argument according to its representation.
///
/// Nothing foreign is touched here; every failure is reported before a call could happen.
pub(crate) fn marshal(params: &[Repr], args: &mut [Arg<'_>]) -> Result<Marshaled, ArgumentErrorKind> {
    if params.len() != args.len() {
        return Err(ArgumentErrorKind::Arity {
            expected: params.len(),
            found: args.len(),
        });
    }
    let mut marshaled = Marshaled::default();
    for (position, (repr, arg)) in params.iter().copied().zip(args.iter_mut()).enumerate() {
        let word = lower(position, repr, arg, &mut marshaled.strings)?;
        marshaled.words.push(word);
    }
    Ok(marshaled)
}

fn lower(
    position: usize,
    repr: Repr,
    arg: &mut Arg<'_>,
    strings: &mut Vec<Vec<u16>>,
) -> Result<usize, ArgumentErrorKind> {
    let mismatch = |arg: &Arg<'_>| ArgumentErrorKind::Mismatch {
        position,
        expected: repr,
        found: arg.kind(),
    };
    let out_of_range = |value: String| ArgumentErrorKind::OutOfRange {
        position,
        expected: repr,
        value,
    };

    let word = match (repr, &mut *arg) {
        (Repr::Int, Arg::Int(v)) => i32::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as isize as usize,
        (Repr::Int, Arg::UInt(v)) => i32::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as isize as usize,
        (Repr::UInt, Arg::Int(v)) => u32::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as usize,
        (Repr::UInt, Arg::UInt(v)) => u32::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as usize,
        (Repr::LongLong, Arg::Int(v)) => isize::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as usize,
        (Repr::LongLong, Arg::UInt(v)) => isize::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as usize,
        (Repr::ULongLong, Arg::Int(v)) => usize::try_from(*v).map_err(|_| out_of_range(v.to_string()))?,
        (Repr::ULongLong, Arg::UInt(v)) => usize::try_from(*v).map_err(|_| out_of_range(v.to_string()))?,
        (Repr::Bool, Arg::Bool(b)) => usize::from(*b),
        (Repr::Bool, Arg::Int(v @ (0 | 1))) => *v as usize,
        (Repr::Bool, Arg::UInt(v @ (0 | 1))) => *v as usize,
        (Repr::Bool, Arg::Int(v)) => return Err(out_of_range(v.to_string())),
        (Repr::Bool, Arg::UInt(v)) => return Err(out_of_range(v.to_string())),
        (Repr::Handle, Arg::Int(v)) => isize::try_from(*v).map_err(|_| out_of_range(v.to_string()))? as usize,
        (Repr::Handle, Arg::UInt(v)) => usize::try_from(*v).map_err(|_| out_of_range(v.to_string()))?,
        (Repr::Handle | Repr::Ptr, Arg::Ptr(p)) => *p as usize,
        (Repr::Guid, Arg::Guid(guid)) => ptr::from_ref::<Guid>(guid) as usize,
        (Repr::OutPtr, Arg::OutPtr(out)) => ptr::from_mut::<*mut c_void>(out) as usize,
        (Repr::OutU32, Arg::OutU32(out)) => ptr::from_mut::<u32>(out) as usize,
        (Repr::WideStr, Arg::Str(text)) => {
            let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
            let word = wide.as_ptr() as usize;
            // the heap buffer does not move when the Vec itself is moved
            strings.push(wide);
            word
        }
        (_, other) => return Err(mismatch(other)),
    };
    Ok(word)
}
