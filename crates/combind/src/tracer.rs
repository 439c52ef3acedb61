//! Binding and dispatch tracing.
//!
//! A [`CallTracer`] observes the life of bound instances: activation, proxy binding, every
//! foreign call, reference counting and capability casts. All hooks default to no-ops, so
//! [`NoopTracer`] costs nothing beyond a virtual call.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Default, records nothing |
//! | [`StderrTracer`] | Human-readable log on stderr |
//! | [`CountingTracer`] | Per-method foreign call counters |
//! | [`RecordingTracer`] | Full event list for post-mortem inspection and tests |
//!
//! Tracers are shared between an instance and every instance produced from it by
//! `query_interface`, so hooks take `&self`.
//!
//! ```
//! use std::rc::Rc;
//! use combind::{BindOptions, RecordingTracer};
//!
//! let tracer = Rc::new(RecordingTracer::new());
//! let options = BindOptions::new().shared_tracer(tracer.clone());
//! assert_eq!(tracer.event_count(), 0);
//! # drop(options);
//! ```

use std::{
    cell::{Cell, RefCell},
    fmt,
};

use ahash::AHashMap;

use crate::{guid::Guid, hresult::HResult, proxy::Returned};

/// Event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A new foreign object was requested from the activator.
    Activate { interface: String, clsid: Guid },
    /// A proxy set was bound to a handle.
    Bind { interface: String, methods: usize },
    /// A foreign call is about to run.
    Call {
        interface: String,
        method: String,
        slot: usize,
        argc: usize,
    },
    /// A foreign call returned without a failure status.
    Return {
        interface: String,
        method: String,
        returned: Returned,
    },
    /// A foreign call returned a failure status.
    Failure {
        interface: String,
        method: String,
        status: HResult,
    },
    /// A new counted reference was acquired.
    Acquire { interface: String, count: u32 },
    /// A counted reference was released.
    Release { interface: String, count: u32 },
    /// An identity query finished.
    QueryInterface {
        interface: String,
        target: Guid,
        supported: bool,
    },
}

/// Hooks invoked by bound instances.
pub trait CallTracer: fmt::Debug {
    /// Called before the activator is asked for a new object.
    #[inline]
    fn on_activate(&self, _interface: &str, _clsid: &Guid) {}

    /// Called after the proxy set of an instance has been built.
    #[inline]
    fn on_bind(&self, _interface: &str, _methods: usize) {}

    /// Called right before the foreign slot is invoked, after arguments were accepted.
    #[inline]
    fn on_call(&self, _interface: &str, _method: &str, _slot: usize, _argc: usize) {}

    /// Called when a foreign call returned a success status or a count.
    #[inline]
    fn on_return(&self, _interface: &str, _method: &str, _returned: Returned) {}

    /// Called when a foreign call returned a failure status.
    #[inline]
    fn on_failure(&self, _interface: &str, _method: &str, _status: HResult) {}

    /// Called after a reference was acquired; `count` is what the object reported.
    #[inline]
    fn on_acquire(&self, _interface: &str, _count: u32) {}

    /// Called after a reference was released; `count` is what the object reported.
    #[inline]
    fn on_release(&self, _interface: &str, _count: u32) {}

    /// Called after an identity query, whether or not the cast succeeded.
    #[inline]
    fn on_query_interface(&self, _interface: &str, _target: &Guid, _supported: bool) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl CallTracer for NoopTracer {}

/// Tracer that prints one line per event to stderr.
///
/// ```text
/// +++ BIND IShellLinkW           methods=21
///   >>> CALL IShellLinkW.SetPath   slot=20  argc=1
///   <<< RETURN IShellLinkW.SetPath Status(S_OK (0x00000000))
/// --- RELEASE IShellLinkW          count=0
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of calls to log. None = unlimited.
    limit: Option<usize>,
    count: Cell<usize>,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that stops logging calls after `limit` of them.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: Cell::new(0),
        }
    }

    fn stopped(&self) -> bool {
        self.limit.is_some_and(|limit| self.count.get() >= limit)
    }
}

impl CallTracer for StderrTracer {
    fn on_activate(&self, interface: &str, clsid: &Guid) {
        eprintln!("+++ ACTIVATE {interface:<20} clsid={clsid}");
    }

    fn on_bind(&self, interface: &str, methods: usize) {
        eprintln!("+++ BIND {interface:<20} methods={methods}");
    }

    fn on_call(&self, interface: &str, method: &str, slot: usize, argc: usize) {
        if self.stopped() {
            return;
        }
        self.count.set(self.count.get() + 1);
        eprintln!("  >>> CALL {interface}.{method:<20} slot={slot}  argc={argc}");
        if self.stopped() {
            eprintln!("--- trace limit reached ({} calls) ---", self.count.get());
        }
    }

    fn on_return(&self, interface: &str, method: &str, returned: Returned) {
        if self.stopped() {
            return;
        }
        eprintln!("  <<< RETURN {interface}.{method} {returned:?}");
    }

    fn on_failure(&self, interface: &str, method: &str, status: HResult) {
        eprintln!("  !!! FAILED {interface}.{method} {status}");
    }

    fn on_acquire(&self, interface: &str, count: u32) {
        eprintln!("+++ ACQUIRE {interface:<20} count={count}");
    }

    fn on_release(&self, interface: &str, count: u32) {
        eprintln!("--- RELEASE {interface:<20} count={count}");
    }

    fn on_query_interface(&self, interface: &str, target: &Guid, supported: bool) {
        let outcome = if supported { "ok" } else { "not supported" };
        eprintln!("  ??? QUERY {interface} -> {target} {outcome}");
    }
}

/// Tracer that counts foreign calls per `Interface.Method`.
#[derive(Debug, Default)]
pub struct CountingTracer {
    calls: RefCell<AHashMap<String, u64>>,
    failures: Cell<u64>,
}

impl CountingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of foreign calls that reached `interface.method`.
    #[must_use]
    pub fn calls(&self, interface: &str, method: &str) -> u64 {
        self.calls
            .borrow()
            .get(&format!("{interface}.{method}"))
            .copied()
            .unwrap_or(0)
    }

    /// Total foreign calls across all methods.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.calls.borrow().values().sum()
    }

    /// Number of calls that returned a failure status.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }
}

impl CallTracer for CountingTracer {
    fn on_call(&self, interface: &str, method: &str, _slot: usize, _argc: usize) {
        *self.calls.borrow_mut().entry(format!("{interface}.{method}")).or_insert(0) += 1;
    }

    fn on_failure(&self, _interface: &str, _method: &str, _status: HResult) {
        self.failures.set(self.failures.get() + 1);
    }
}

/// Tracer that records every event in order.
///
/// Allocates per event, so keep it to tests and short debugging sessions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: RefCell<Vec<TraceEvent>>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder that stops after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: RefCell::new(Vec::with_capacity(limit.min(1024))),
            limit: Some(limit),
        }
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }

    /// Drops everything recorded so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: TraceEvent) {
        let mut events = self.events.borrow_mut();
        if self.limit.is_some_and(|limit| events.len() >= limit) {
            return;
        }
        events.push(event);
    }
}

impl CallTracer for RecordingTracer {
    fn on_activate(&self, interface: &str, clsid: &Guid) {
        self.push(TraceEvent::Activate {
            interface: interface.to_owned(),
            clsid: *clsid,
        });
    }

    fn on_bind(&self, interface: &str, methods: usize) {
        self.push(TraceEvent::Bind {
            interface: interface.to_owned(),
            methods,
        });
    }

    fn on_call(&self, interface: &str, method: &str, slot: usize, argc: usize) {
        self.push(TraceEvent::Call {
            interface: interface.to_owned(),
            method: method.to_owned(),
            slot,
            argc,
        });
    }

    fn on_return(&self, interface: &str, method: &str, returned: Returned) {
        self.push(TraceEvent::Return {
            interface: interface.to_owned(),
            method: method.to_owned(),
            returned,
        });
    }

    fn on_failure(&self, interface: &str, method: &str, status: HResult) {
        self.push(TraceEvent::Failure {
            interface: interface.to_owned(),
            method: method.to_owned(),
            status,
        });
    }

    fn on_acquire(&self, interface: &str, count: u32) {
        self.push(TraceEvent::Acquire {
            interface: interface.to_owned(),
            count,
        });
    }

    fn on_release(&self, interface: &str, count: u32) {
        self.push(TraceEvent::Release {
            interface: interface.to_owned(),
            count,
        });
    }

    fn on_query_interface(&self, interface: &str, target: &Guid, supported: bool) {
        self.push(TraceEvent::QueryInterface {
            interface: interface.to_owned(),
            target: *target,
            supported,
        });
    }
}
