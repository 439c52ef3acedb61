//! 128-bit identity descriptors (IID / CLSID).
//!
//! A [`Guid`] names either an interface contract or an instantiable class. The layout
//! matches the platform `GUID` structure so a `&Guid` can be handed straight to a
//! foreign method that expects a `REFIID`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A 128-bit identity value with the platform `GUID` layout.
///
/// `data1..data3` are stored in native byte order, `data4` as raw bytes, exactly as the
/// foreign side lays them out in memory. Comparison is plain value equality.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// The all-zero identity.
    pub const NULL: Self = Self::from_u128(0);

    /// Builds an identity from its 128-bit big-endian numeric form.
    ///
    /// `Guid::from_u128(0x00000000_0000_0000_C000_000000000046)` is the identity written
    /// textually as `{00000000-0000-0000-C000-000000000046}`.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        let bytes = value.to_be_bytes();
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: [
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
            ],
        }
    }

    /// Returns the 128-bit big-endian numeric form.
    #[must_use]
    pub const fn to_u128(self) -> u128 {
        let mut value = ((self.data1 as u128) << 96) | ((self.data2 as u128) << 80) | ((self.data3 as u128) << 64);
        let mut i = 0;
        while i < 8 {
            value |= (self.data4[i] as u128) << (8 * (7 - i));
            i += 1;
        }
        value
    }

    /// Parses the textual form of an identity.
    ///
    /// Accepts the braced (`{...}`), hyphenated, simple (32 hex digits) and URN forms,
    /// case-insensitively.
    pub fn parse(text: &str) -> Result<Self, IdentityParseError> {
        let uuid = Uuid::parse_str(text.trim()).map_err(|_| IdentityParseError {
            text: text.to_owned(),
        })?;
        Ok(Self::from_u128(uuid.as_u128()))
    }

    /// Returns true for the all-zero identity.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.to_u128() == 0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        for byte in &self.data4[2..] {
            write!(f, "{byte:02X}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl FromStr for Guid {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for Guid {
    fn from(uuid: Uuid) -> Self {
        Self::from_u128(uuid.as_u128())
    }
}

impl From<Guid> for Uuid {
    fn from(guid: Guid) -> Self {
        Self::from_u128(guid.to_u128())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Error returned when identity text is not a valid GUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityParseError {
    /// The rejected input.
    pub text: String,
}

impl fmt::Display for IdentityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid identity '{}'", self.text)
    }
}

impl std::error::Error for IdentityParseError {}
