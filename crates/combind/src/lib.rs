#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "words are narrowed to the declared widths")]
#![expect(clippy::cast_sign_loss, reason = "signed values are lowered to raw machine words")]
#![expect(clippy::cast_possible_wrap, reason = "status codes reinterpret their bit patterns")]

mod activation;
mod config;
mod descriptor;
mod dispatch;
mod error;
mod guid;
mod handle;
mod hresult;
pub mod manifest;
mod proxy;
pub mod registry;
mod repr;
pub mod tracer;
mod unknown;

#[cfg(windows)]
pub use crate::activation::{Ole32Activator, initialize_apartment, uninitialize_apartment};
pub use crate::{
    activation::Activator,
    config::{ApartmentModel, BindOptions, ClassContext},
    descriptor::{DescriptorCell, Interface, InterfaceBuilder, InterfaceTable, MethodDescriptor, MethodEntry},
    dispatch::MAX_PARAMS,
    error::{
        ArgumentError, ArgumentErrorKind, ComError, DeclarationError, ForeignCallError, InterfaceNotSupportedError,
        UnboundMethodError, UnboundReason,
    },
    guid::{Guid, IdentityParseError},
    handle::{ComPtr, slots},
    hresult::HResult,
    manifest::InterfaceManifest,
    proxy::{BoundMethod, BoundProxySet, Returned},
    repr::{Arg, Repr, ReturnKind, TypeHint, one_of},
    tracer::{CallTracer, CountingTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    unknown::{BindState, ComObject, IUnknown, Object},
};
