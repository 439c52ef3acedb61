use std::fmt;

use crate::{guid::Guid, hresult::HResult, repr::Repr};

/// Error type for every binding and dispatch operation, separated by where it surfaces.
///
/// Declaration problems show up when an interface type is defined, unbound/argument
/// problems show up at call time before anything foreign runs, and the last two carry an
/// outcome the foreign object itself reported. Nothing in this crate retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComError {
    /// The interface description is malformed; the type is unusable.
    Declaration(DeclarationError),
    /// A method was invoked on an instance that has no live binding for it.
    UnboundMethod(UnboundMethodError),
    /// Arguments did not match the method's declared parameters.
    Argument(ArgumentError),
    /// The foreign call returned a failure status.
    ForeignCall(ForeignCallError),
    /// The foreign object declined a capability cast.
    InterfaceNotSupported(InterfaceNotSupportedError),
}

impl fmt::Display for ComError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaration(error) => write!(f, "{error}"),
            Self::UnboundMethod(error) => write!(f, "{error}"),
            Self::Argument(error) => write!(f, "{error}"),
            Self::ForeignCall(error) => write!(f, "{error}"),
            Self::InterfaceNotSupported(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ComError {}

impl From<DeclarationError> for ComError {
    fn from(error: DeclarationError) -> Self {
        Self::Declaration(error)
    }
}

impl From<UnboundMethodError> for ComError {
    fn from(error: UnboundMethodError) -> Self {
        Self::UnboundMethod(error)
    }
}

impl From<ArgumentError> for ComError {
    fn from(error: ArgumentError) -> Self {
        Self::Argument(error)
    }
}

impl From<ForeignCallError> for ComError {
    fn from(error: ForeignCallError) -> Self {
        Self::ForeignCall(error)
    }
}

impl From<InterfaceNotSupportedError> for ComError {
    fn from(error: InterfaceNotSupportedError) -> Self {
        Self::InterfaceNotSupported(error)
    }
}

/// A malformed interface declaration, detected when the descriptor table is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// Two methods declared directly on one interface share a slot index.
    DuplicateIndex {
        interface: String,
        index: usize,
        first: String,
        second: String,
    },
    /// One interface declares the same method name twice.
    DuplicateMethod { interface: String, method: String },
    /// A second interface tried to register an identity that is already taken.
    DuplicateIdentity {
        iid: Guid,
        existing: String,
        interface: String,
    },
    /// Identity text could not be parsed.
    InvalidIdentity { interface: String, text: String },
    /// A parameter offered an empty choice of representations.
    EmptyTypeChoice {
        interface: String,
        method: String,
        position: usize,
    },
    /// A representation cannot be passed in one word on this target.
    UnsupportedRepr {
        interface: String,
        method: String,
        repr: Repr,
    },
    /// More parameters than the dispatcher can forward.
    TooManyParameters {
        interface: String,
        method: String,
        count: usize,
        max: usize,
    },
    /// An identity was referenced that no interface has registered.
    UnregisteredIdentity { iid: Guid },
    /// Activation was requested for an interface without a class identity.
    MissingClassIdentity { interface: String },
}

impl fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateIndex {
                interface,
                index,
                first,
                second,
            } => write!(
                f,
                "declaration error: {interface}.{second} reuses slot {index} already taken by {interface}.{first}"
            ),
            Self::DuplicateMethod { interface, method } => {
                write!(f, "declaration error: {interface}.{method} is declared twice")
            }
            Self::DuplicateIdentity {
                iid,
                existing,
                interface,
            } => write!(
                f,
                "declaration error: {interface} cannot register {iid}, already registered by {existing}"
            ),
            Self::InvalidIdentity { interface, text } => {
                write!(f, "declaration error: {interface} has invalid identity '{text}'")
            }
            Self::EmptyTypeChoice {
                interface,
                method,
                position,
            } => write!(
                f,
                "declaration error: {interface}.{method} parameter {position} offers no representation"
            ),
            Self::UnsupportedRepr {
                interface,
                method,
                repr,
            } => write!(
                f,
                "declaration error: {interface}.{method} uses {repr}, which does not fit a machine word on this target"
            ),
            Self::TooManyParameters {
                interface,
                method,
                count,
                max,
            } => write!(
                f,
                "declaration error: {interface}.{method} declares {count} parameters, at most {max} are supported"
            ),
            Self::UnregisteredIdentity { iid } => {
                write!(f, "declaration error: no interface is registered for {iid}")
            }
            Self::MissingClassIdentity { interface } => {
                write!(f, "declaration error: {interface} has no class identity to activate")
            }
        }
    }
}

impl std::error::Error for DeclarationError {}

/// Why a method had no live binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnboundReason {
    /// The instance never completed base construction.
    NotBound,
    /// The instance already released its reference.
    Released,
    /// The method is declared but carries no slot descriptor.
    Stub,
    /// No method of that name exists on the interface.
    NotDeclared,
}

/// A method invoked without a live binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundMethodError {
    pub interface: String,
    pub method: String,
    pub reason: UnboundReason,
}

impl fmt::Display for UnboundMethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            interface,
            method,
            reason,
        } = self;
        match reason {
            UnboundReason::NotBound => {
                write!(f, "unbound method: {interface}.{method} called before the instance was bound")
            }
            UnboundReason::Released => {
                write!(f, "unbound method: {interface}.{method} called after the instance was released")
            }
            UnboundReason::Stub => write!(f, "unbound method: {interface}.{method} has no slot descriptor"),
            UnboundReason::NotDeclared => write!(f, "unbound method: {interface} declares no method {method}"),
        }
    }
}

impl std::error::Error for UnboundMethodError {}

/// What was wrong with the arguments of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentErrorKind {
    Arity { expected: usize, found: usize },
    Mismatch {
        position: usize,
        expected: Repr,
        found: &'static str,
    },
    OutOfRange {
        position: usize,
        expected: Repr,
        value: String,
    },
}

/// Arguments rejected before the foreign call was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    pub interface: String,
    pub method: String,
    pub kind: ArgumentErrorKind,
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { interface, method, kind } = self;
        match kind {
            ArgumentErrorKind::Arity { expected, found } => {
                write!(f, "argument error: {interface}.{method} takes {expected} arguments, got {found}")
            }
            ArgumentErrorKind::Mismatch {
                position,
                expected,
                found,
            } => write!(
                f,
                "argument error: {interface}.{method} argument {position} expects {expected}, got {found}"
            ),
            ArgumentErrorKind::OutOfRange {
                position,
                expected,
                value,
            } => write!(
                f,
                "argument error: {interface}.{method} argument {position} value {value} does not fit {expected}"
            ),
        }
    }
}

impl std::error::Error for ArgumentError {}

/// A foreign call that returned a failure status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignCallError {
    pub interface: String,
    pub method: String,
    pub status: HResult,
}

impl fmt::Display for ForeignCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "foreign call error: {}.{} returned {}", self.interface, self.method, self.status)
    }
}

impl std::error::Error for ForeignCallError {}

/// The foreign object does not implement the requested interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceNotSupportedError {
    /// Interface the cast started from.
    pub interface: String,
    /// Identity that was requested.
    pub target: Guid,
    /// Status the identity query returned.
    pub status: HResult,
}

impl fmt::Display for InterfaceNotSupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interface not supported: {} object does not implement {} ({})",
            self.interface, self.target, self.status
        )
    }
}

impl std::error::Error for InterfaceNotSupportedError {}
