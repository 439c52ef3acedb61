//! Foreign status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit foreign status code.
///
/// The high (severity) bit marks failure, so every negative value is an error and every
/// non-negative value is a success code. `S_FALSE` is a success: callers receive it
/// unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);
    pub const E_NOTIMPL: Self = Self::from_bits(0x8000_4001);
    pub const E_NOINTERFACE: Self = Self::from_bits(0x8000_4002);
    pub const E_POINTER: Self = Self::from_bits(0x8000_4003);
    pub const E_FAIL: Self = Self::from_bits(0x8000_4005);
    pub const E_INVALIDARG: Self = Self::from_bits(0x8007_0057);
    pub const CLASS_E_NOAGGREGATION: Self = Self::from_bits(0x8004_0110);
    pub const REGDB_E_CLASSNOTREG: Self = Self::from_bits(0x8004_0154);
    pub const RPC_E_CHANGED_MODE: Self = Self::from_bits(0x8001_0106);

    /// Reinterprets an unsigned bit pattern (as status codes are usually written).
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits as i32)
    }

    /// Returns the unsigned bit pattern.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Converts a failure code into `Err(self)`, passing success codes through.
    pub const fn ok(self) -> Result<Self, Self> {
        if self.is_failure() { Err(self) } else { Ok(self) }
    }

    /// Facility field (bits 16..29).
    #[must_use]
    pub const fn facility(self) -> u16 {
        ((self.bits() >> 16) & 0x1FFF) as u16
    }

    /// Code field (low 16 bits).
    #[must_use]
    pub const fn code(self) -> u16 {
        (self.bits() & 0xFFFF) as u16
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_FAIL => "E_FAIL",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::CLASS_E_NOAGGREGATION => "CLASS_E_NOAGGREGATION",
            Self::REGDB_E_CLASSNOTREG => "REGDB_E_CLASSNOTREG",
            Self::RPC_E_CHANGED_MODE => "RPC_E_CHANGED_MODE",
            _ => return None,
        })
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.bits()),
            None => write!(f, "0x{:08X}", self.bits()),
        }
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

impl From<i32> for HResult {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}
