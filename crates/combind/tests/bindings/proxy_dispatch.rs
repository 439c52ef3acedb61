//! Calls through bound proxies against the mock foreign object.

use std::rc::Rc;

use combind::{
    Arg, ArgumentError, ArgumentErrorKind, BindOptions, ComError, ComObject, CountingTracer, ForeignCallError,
    HResult, RecordingTracer, Repr, Returned, TraceEvent, UnboundMethodError, UnboundReason,
};
use pretty_assertions::assert_eq;

use crate::mock::{IA, IB, IC, MOCK_CLSID, MockActivator, MockObject};

#[test]
fn call_forwards_arguments_to_the_declared_slot() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IA>::create(&activator).unwrap();

    let returned = object.call("Foo", &mut [Arg::from(42)]).unwrap();
    assert_eq!(returned, Returned::Status(HResult::S_OK));
    assert_eq!(mock.last_int(), 42);

    object.call("Foo", &mut [Arg::Int(-7)]).unwrap();
    assert_eq!(mock.last_int(), -7);
    assert_eq!(mock.calls(), 2);
}

#[test]
fn inherited_methods_are_callable_on_derived_instances() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();

    object.call("Foo", &mut [Arg::Int(9)]).unwrap();
    assert_eq!(mock.last_int(), 9);
    assert_eq!(object.method("Foo").unwrap().index(), 3);
    assert_eq!(object.method("Bar").unwrap().index(), 4);
}

#[test]
fn wrong_arity_is_rejected_before_the_foreign_call() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let tracer = Rc::new(CountingTracer::new());
    let options = BindOptions::new().shared_tracer(tracer.clone());
    let mut object = ComObject::<IA>::create_with(&activator, &options).unwrap();

    let err = object.call("Foo", &mut []).unwrap_err();
    assert_eq!(
        err,
        ComError::Argument(ArgumentError {
            interface: "IA".to_owned(),
            method: "Foo".to_owned(),
            kind: ArgumentErrorKind::Arity { expected: 1, found: 0 },
        })
    );
    let err = object.call("Foo", &mut [Arg::Int(1), Arg::Int(2)]).unwrap_err();
    assert!(matches!(
        err,
        ComError::Argument(ArgumentError {
            kind: ArgumentErrorKind::Arity { expected: 1, found: 2 },
            ..
        })
    ));
    assert_eq!(mock.calls(), 0);
    assert_eq!(tracer.total_calls(), 0);
}

#[test]
fn mismatched_and_out_of_range_arguments_are_rejected() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();

    let err = object
        .call("Sum", &mut [Arg::Int(1), Arg::Str("two"), Arg::Bool(false)])
        .unwrap_err();
    assert_eq!(
        err,
        ComError::Argument(ArgumentError {
            interface: "IC".to_owned(),
            method: "Sum".to_owned(),
            kind: ArgumentErrorKind::Mismatch {
                position: 1,
                expected: Repr::UInt,
                found: "str",
            },
        })
    );

    let err = object
        .call("Sum", &mut [Arg::Int(1), Arg::Int(-2), Arg::Bool(false)])
        .unwrap_err();
    assert!(matches!(
        err,
        ComError::Argument(ArgumentError {
            kind: ArgumentErrorKind::OutOfRange { position: 1, .. },
            ..
        })
    ));

    let err = object.call("Foo", &mut [Arg::Int(i64::from(i32::MAX) + 1)]).unwrap_err();
    assert!(matches!(
        err,
        ComError::Argument(ArgumentError {
            kind: ArgumentErrorKind::OutOfRange { position: 0, .. },
            ..
        })
    ));
    assert_eq!(mock.calls(), 0);
}

#[test]
fn mixed_parameter_kinds_are_lowered_in_order() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();

    object
        .call("Sum", &mut [Arg::Int(-10), Arg::UInt(3), Arg::Bool(false)])
        .unwrap();
    assert_eq!(mock.last_int(), -7);
    object
        .call("Sum", &mut [Arg::Int(4), Arg::from(5u32), Arg::from(true)])
        .unwrap();
    assert_eq!(mock.last_int(), -9);
}

#[test]
fn failure_status_surfaces_verbatim() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let tracer = Rc::new(CountingTracer::new());
    let options = BindOptions::new().shared_tracer(tracer.clone());
    let mut object = ComObject::<IC>::create_with(&activator, &options).unwrap();

    let err = object.call("Fail", &mut []).unwrap_err();
    assert_eq!(
        err,
        ComError::ForeignCall(ForeignCallError {
            interface: "IC".to_owned(),
            method: "Fail".to_owned(),
            status: HResult::E_FAIL,
        })
    );
    assert_eq!(mock.calls(), 1);
    assert_eq!(tracer.calls("IC", "Fail"), 1);
    assert_eq!(tracer.failures(), 1);
}

#[test]
fn s_false_is_a_success() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IB>::create(&activator).unwrap();

    let returned = object.call("Bar", &mut []).unwrap();
    assert_eq!(returned.status(), Some(HResult::S_FALSE));
    assert!(returned.status().unwrap().is_success());
}

#[test]
fn choice_parameter_uses_its_first_representation() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();
    assert_eq!(object.method("Describe").unwrap().params(), &[Repr::WideStr, Repr::OutU32]);

    let mut units = 0u32;
    object
        .call("Describe", &mut [Arg::Str("héllo"), Arg::OutU32(&mut units)])
        .unwrap();
    assert_eq!(units, 5);
}

#[test]
fn count_returning_slots_report_the_raw_count() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();

    let returned = object.call("Peek", &mut []).unwrap();
    assert_eq!(returned, Returned::Count(1));
    assert_eq!(returned.status(), None);
}

#[test]
fn stub_methods_fail_without_calling_out() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let mut object = ComObject::<IC>::create(&activator).unwrap();

    let err = object.call("Helper", &mut []).unwrap_err();
    assert_eq!(
        err,
        ComError::UnboundMethod(UnboundMethodError {
            interface: "IC".to_owned(),
            method: "Helper".to_owned(),
            reason: UnboundReason::Stub,
        })
    );
    let err = object.call("Missing", &mut []).unwrap_err();
    assert!(matches!(
        err,
        ComError::UnboundMethod(UnboundMethodError {
            reason: UnboundReason::NotDeclared,
            ..
        })
    ));
    assert_eq!(mock.calls(), 0);
}

#[test]
fn every_instance_gets_its_own_proxy_set() {
    let first_mock = MockObject::new();
    let second_mock = MockObject::new();
    let first_activator = MockActivator::new(&first_mock);
    let second_activator = MockActivator::new(&second_mock);
    let mut first = ComObject::<IA>::create(&first_activator).unwrap();
    let mut second = ComObject::<IA>::create(&second_activator).unwrap();

    assert_eq!(first.proxies().unwrap().len(), 4);
    assert!(!std::ptr::eq(first.method("Foo").unwrap(), second.method("Foo").unwrap()));

    first.call("Foo", &mut [Arg::Int(1)]).unwrap();
    second.call("Foo", &mut [Arg::Int(2)]).unwrap();
    assert_eq!((first_mock.last_int(), second_mock.last_int()), (1, 2));
    assert_eq!((first_mock.calls(), second_mock.calls()), (1, 1));
}

#[test]
fn recorded_events_follow_the_instance_lifecycle() {
    let mock = MockObject::new();
    let activator = MockActivator::new(&mock);
    let tracer = Rc::new(RecordingTracer::new());
    let options = BindOptions::new().shared_tracer(tracer.clone());
    let mut object = ComObject::<IC>::create_with(&activator, &options).unwrap();

    object.call("Foo", &mut [Arg::Int(5)]).unwrap();
    object.call("Fail", &mut []).unwrap_err();
    object.call("Foo", &mut []).unwrap_err();
    drop(object);

    let owned = |s: &str| s.to_owned();
    assert_eq!(
        tracer.events(),
        vec![
            TraceEvent::Activate {
                interface: owned("IC"),
                clsid: MOCK_CLSID,
            },
            TraceEvent::Bind {
                interface: owned("IC"),
                methods: 9,
            },
            TraceEvent::Call {
                interface: owned("IC"),
                method: owned("Foo"),
                slot: 3,
                argc: 1,
            },
            TraceEvent::Return {
                interface: owned("IC"),
                method: owned("Foo"),
                returned: Returned::Status(HResult::S_OK),
            },
            TraceEvent::Call {
                interface: owned("IC"),
                method: owned("Fail"),
                slot: 5,
                argc: 0,
            },
            TraceEvent::Failure {
                interface: owned("IC"),
                method: owned("Fail"),
                status: HResult::E_FAIL,
            },
            TraceEvent::Release {
                interface: owned("IC"),
                count: 0,
            },
        ]
    );
}
