//! Reference counting and capability casts through the root slots.

use std::{ffi::c_void, ptr::NonNull, rc::Rc, sync::Arc};

use combind::{
    Arg, BindOptions, BindState, ComError, ComObject, ComPtr, DeclarationError, ForeignCallError, Guid, HResult,
    IUnknown, Interface, InterfaceBuilder, InterfaceNotSupportedError, Object, RecordingTracer, Returned,
    TraceEvent, UnboundMethodError, UnboundReason,
};
use pretty_assertions::assert_eq;

use crate::mock::{IA, IB, IC, IOther, MockActivator, MockObject};

#[test]
fn construction_takes_exactly_one_reference_and_drop_gives_it_back() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IA>::create(&activator).unwrap();

    assert_eq!(activator.activations(), 1);
    assert_eq!(mock.refs(), 1);
    assert_eq!(object.state(), BindState::Bound);
    assert!(object.is_accessible());
    assert_eq!(object.as_raw(), Some(mock.as_raw()));

    drop(object);
    assert_eq!(mock.refs(), 0);
    assert_eq!(mock.releases(), 1);
}

#[test]
fn release_is_idempotent() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IA>::create(&activator).unwrap();

    assert_eq!(object.release_reference(), Some(0));
    assert_eq!(object.release_reference(), None);
    assert_eq!(object.state(), BindState::Released);
    assert!(!object.is_accessible());
    assert!(object.handle().is_none());

    let err = object.call("Foo", &mut [Arg::Int(1)]).unwrap_err();
    assert_eq!(
        err,
        ComError::UnboundMethod(UnboundMethodError {
            interface: "IA".to_owned(),
            method: "Foo".to_owned(),
            reason: UnboundReason::Released,
        })
    );

    drop(object);
    assert_eq!(mock.releases(), 1);
    assert_eq!(mock.calls(), 0);
}

#[test]
fn unbound_instances_never_touch_an_object() {
    let mut object = ComObject::<IB>::unbound().unwrap();
    assert_eq!(object.state(), BindState::Unbound);
    assert!(object.proxies().is_none());

    let err = object.call("Bar", &mut []).unwrap_err();
    assert!(matches!(
        err,
        ComError::UnboundMethod(UnboundMethodError {
            reason: UnboundReason::NotBound,
            ..
        })
    ));
    assert!(object.query_interface(&IA::IID).is_err());
    assert!(object.acquire_reference().is_err());
    assert_eq!(object.release_reference(), None);
    assert_eq!(object.state(), BindState::Unbound);
}

#[test]
fn query_interface_yields_an_independent_instance() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IA>::create(&activator).unwrap();
    IB::table().unwrap();

    let mut cast = object.query_interface(&IB::IID).unwrap();
    assert_eq!(mock.queries(), 1);
    assert_eq!(mock.refs(), 2);
    assert_eq!(cast.interface().name(), "IB");
    assert!(cast.handle().unwrap().same_object(object.handle().unwrap()));

    drop(object);
    assert_eq!(mock.refs(), 1);
    cast.call("Bar", &mut []).unwrap();
    assert_eq!(mock.calls(), 1);

    drop(cast);
    assert_eq!(mock.refs(), 0);
}

#[test]
fn typed_cast_declares_and_binds_the_target() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let tracer = Rc::new(RecordingTracer::new());
    let options = BindOptions::new().shared_tracer(tracer.clone());
    let object = ComObject::<IA>::create_with(&activator, &options).unwrap();

    let mut cast = object.cast::<IC>().unwrap();
    assert!(Arc::ptr_eq(cast.interface(), &IC::table().unwrap()));
    cast.call("Foo", &mut [Arg::Int(11)]).unwrap();
    assert_eq!(mock.last_int(), 11);

    let events = tracer.events();
    assert!(events.contains(&TraceEvent::QueryInterface {
        interface: "IA".to_owned(),
        target: IC::IID,
        supported: true,
    }));
    assert!(events.contains(&TraceEvent::Bind {
        interface: "IC".to_owned(),
        methods: 9,
    }));
}

#[test]
fn unsupported_cast_leaves_the_count_alone() {
    let mock = MockObject::supporting(vec![IUnknown::IID, IA::IID]);
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IA>::create(&activator).unwrap();
    IB::table().unwrap();

    let err = object.cast::<IOther>().unwrap_err();
    assert_eq!(
        err,
        ComError::InterfaceNotSupported(InterfaceNotSupportedError {
            interface: "IA".to_owned(),
            target: IOther::IID,
            status: HResult::E_NOINTERFACE,
        })
    );
    assert!(matches!(object.query_interface(&IB::IID), Err(ComError::InterfaceNotSupported(_))));
    assert_eq!(mock.queries(), 2);
    assert_eq!(mock.refs(), 1);
    assert!(object.is_accessible());
}

#[test]
fn unregistered_target_is_rejected_before_querying() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IA>::create(&activator).unwrap();
    let unknown = Guid::from_u128(0x7d3a_0c11_5e0f_4c6b_9a51_0000_0000_0d01);

    let err = object.query_interface(&unknown).unwrap_err();
    assert_eq!(
        err,
        ComError::Declaration(DeclarationError::UnregisteredIdentity { iid: unknown })
    );
    assert_eq!(mock.queries(), 0);
}

#[test]
fn root_interface_is_always_a_valid_cast_target() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IC>::create(&activator).unwrap();

    let root = object.query_interface(&IUnknown::IID).unwrap();
    assert_eq!(root.interface().name(), "IUnknown");
    assert_eq!(root.proxies().unwrap().len(), 3);
    assert_eq!(mock.refs(), 2);
}

#[test]
fn acquired_references_are_released_by_their_handle() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let object = ComObject::<IA>::create(&activator).unwrap();

    let extra = object.acquire_reference().unwrap();
    assert_eq!(mock.refs(), 2);
    let again = extra.clone();
    assert_eq!(mock.refs(), 3);
    drop(extra);
    assert_eq!(again.release(), 1);

    drop(object);
    assert_eq!(mock.refs(), 0);
    assert_eq!(mock.add_refs(), mock.releases());
}

#[test]
fn counting_slots_called_by_name_stay_balanced() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IA>::create(&activator).unwrap();

    assert_eq!(object.call("AddRef", &mut []).unwrap(), Returned::Count(2));
    assert_eq!(object.call("AddRef", &mut []).unwrap(), Returned::Count(3));
    assert_eq!(object.call("Release", &mut []).unwrap(), Returned::Count(2));
    assert_eq!(object.state(), BindState::Bound);

    // one AddRef is still outstanding; dropping gives back both units
    drop(object);
    assert_eq!(mock.refs(), 0);
}

#[test]
fn releasing_by_name_releases_the_instance() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IA>::create(&activator).unwrap();

    assert_eq!(object.call("Release", &mut []).unwrap(), Returned::Count(0));
    assert_eq!(object.state(), BindState::Released);
    drop(object);
    assert_eq!(mock.releases(), 1);
}

#[test]
fn inspected_release_slot_cannot_release_twice() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let own = mock.acquire();
    let mut object = ComObject::<IA>::create(&activator).unwrap();
    assert_eq!(mock.refs(), 2);

    // the bound method is only inspectable; releasing goes through the instance
    assert_eq!(object.method("Release").unwrap().index(), 2);
    object.call("Release", &mut []).unwrap();
    assert!(object.call("Release", &mut []).is_err());
    drop(object);
    assert_eq!(mock.refs(), 1);
    assert_eq!(mock.releases(), 1);

    // SAFETY: `acquire` took one reference that this handle now owns.
    drop(unsafe { ComPtr::from_raw(own) });
    assert_eq!(mock.refs(), 0);
}

#[test]
fn typed_instances_format_for_any_interface() {
    let object = ComObject::<IOther>::unbound().unwrap();
    let text = format!("{object:?}");
    assert!(text.starts_with("ComObject(Object"), "{text}");
}

#[test]
fn query_interface_slot_is_callable_by_name() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IA>::create(&activator).unwrap();

    let mut out: *mut c_void = std::ptr::null_mut();
    let returned = object
        .call("QueryInterface", &mut [Arg::Guid(&IB::IID), Arg::OutPtr(&mut out)])
        .unwrap();
    assert_eq!(returned, Returned::Status(HResult::S_OK));
    let raw = NonNull::new(out).unwrap();
    assert_eq!(raw, mock.as_raw());
    assert_eq!(mock.refs(), 2);

    // SAFETY: the successful query handed us one reference to the mock.
    drop(unsafe { ComPtr::from_raw(raw) });
    assert_eq!(mock.refs(), 1);
}

#[test]
fn activation_failures_are_reported() {
    let mock = MockObject::supporting(vec![IUnknown::IID, IA::IID]);
    let activator = MockActivator::new(&mock);

    let err = ComObject::<IC>::create(&activator).unwrap_err();
    assert_eq!(
        err,
        ComError::ForeignCall(ForeignCallError {
            interface: "IC".to_owned(),
            method: "activate".to_owned(),
            status: HResult::E_NOINTERFACE,
        })
    );

    let err = ComObject::<IOther>::create(&activator).unwrap_err();
    assert_eq!(
        err,
        ComError::Declaration(DeclarationError::MissingClassIdentity {
            interface: "IOther".to_owned(),
        })
    );

    let elsewhere = InterfaceBuilder::new("IElsewhere", Guid::from_u128(0x7d3a_0c11_5e0f_4c6b_9a51_0000_0000_0d02))
        .class_id(Guid::from_u128(0x7d3a_0c11_5e0f_4c6b_9a51_0000_0000_0dc1))
        .extends::<IUnknown>()
        .build()
        .unwrap();
    let err = Object::create(Arc::new(elsewhere), &activator, &BindOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        ComError::ForeignCall(ForeignCallError {
            status: HResult::REGDB_E_CLASSNOTREG,
            ..
        })
    ));

    assert_eq!(activator.activations(), 0);
    assert_eq!(mock.refs(), 0);
}

#[test]
fn adopting_a_handle_skips_activation() {
    let mock = MockObject::new();
    // SAFETY: `acquire` took one reference that the handle now owns.
    let handle = unsafe { ComPtr::from_raw(mock.acquire()) };
    // SAFETY: the mock implements IB.
    let mut object = unsafe { ComObject::<IB>::from_handle(handle) }.unwrap();

    assert_eq!(mock.refs(), 1);
    object.call("Bar", &mut []).unwrap();
    drop(object);
    assert_eq!(mock.refs(), 0);
    assert_eq!(mock.add_refs(), 1);
}
