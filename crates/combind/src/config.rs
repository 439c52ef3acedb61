//! Instance and activation configuration.

use std::{fmt, ops::BitOr, rc::Rc};

use crate::tracer::{CallTracer, NoopTracer};

/// Options applied when an instance is constructed.
///
/// Instances produced by a capability cast inherit the options of the instance they were
/// cast from.
#[derive(Debug, Clone)]
pub struct BindOptions {
    tracer: Rc<dyn CallTracer>,
}

impl BindOptions {
    /// Default options: no tracing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracer: Rc::new(NoopTracer),
        }
    }

    /// Uses `tracer` for instances built with these options.
    #[must_use]
    pub fn tracer(mut self, tracer: impl CallTracer + 'static) -> Self {
        self.tracer = Rc::new(tracer);
        self
    }

    /// Uses a tracer the caller keeps a handle to, e.g. to inspect recorded events.
    #[must_use]
    pub fn shared_tracer(mut self, tracer: Rc<dyn CallTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub(crate) fn tracer_handle(&self) -> &Rc<dyn CallTracer> {
        &self.tracer
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution contexts an activator may create a class object in (`CLSCTX_*`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassContext(u32);

impl ClassContext {
    pub const INPROC_SERVER: Self = Self(0x1);
    pub const INPROC_HANDLER: Self = Self(0x2);
    pub const LOCAL_SERVER: Self = Self(0x4);
    pub const REMOTE_SERVER: Self = Self(0x10);
    pub const ALL: Self = Self(0x1 | 0x2 | 0x4 | 0x10);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ClassContext {
    fn default() -> Self {
        Self::INPROC_SERVER
    }
}

impl BitOr for ClassContext {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ClassContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassContext(0x{:X})", self.0)
    }
}

/// Threading model for apartment initialisation (`COINIT_*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApartmentModel {
    /// Single-threaded apartment.
    #[default]
    SingleThreaded,
    /// Multi-threaded apartment.
    MultiThreaded,
}

impl ApartmentModel {
    #[must_use]
    pub const fn flags(self) -> u32 {
        match self {
            Self::SingleThreaded => 0x2,
            Self::MultiThreaded => 0x0,
        }
    }
}
