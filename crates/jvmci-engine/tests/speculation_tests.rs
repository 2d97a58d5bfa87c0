//! Speculation Log Tests
//!
//! Speculation ids, failure propagation through the host's failed list, and
//! release of lists owned by a log.

mod common;

use common::{runtime, Fixture};
use jvmci_engine::speculation::ReasonPart;
use jvmci_engine::{HotSpotSpeculationLog, JavaConstant, JvmciError, SpeculationReason};

fn null_check(bci: i32) -> SpeculationReason {
    SpeculationReason::new(1, "NullCheck").with(ReasonPart::Int(bci))
}

#[test]
fn test_identical_reasons_share_an_id() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let log = HotSpotSpeculationLog::new(rt.context());

    let a = log.speculate(null_check(4)).unwrap();
    let b = log.speculate(null_check(4)).unwrap();
    let c = log.speculate(null_check(9)).unwrap();
    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_eq!(c.id.offset, a.id.length);

    let encodings = log.flattened_encodings();
    assert_eq!(encodings.len(), (a.id.length + c.id.length) as usize);
    assert_eq!(&encodings[..a.id.length as usize], null_check(4).encode().as_slice());
}

#[test]
fn test_shared_id_keeps_the_first_reason() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let log = HotSpotSpeculationLog::new(rt.context());
    let first = SpeculationReason::new(1, "NullCheck").with(ReasonPart::Int(4));
    let renamed = SpeculationReason::new(1, "ImplicitNullCheck").with(ReasonPart::Int(4));
    assert_eq!(first.encode(), renamed.encode());

    let a = log.speculate(first.clone()).unwrap();
    let b = log.speculate(renamed).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(b.reason, first);
    assert_eq!(log.lookup_speculation(&b.constant()).unwrap().reason, b.reason);
}

#[test]
fn test_lookup_by_embedded_constant() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let log = HotSpotSpeculationLog::new(rt.context());
    let method = fx.host.method(fx.point, "length", "()D").unwrap();
    let reason = SpeculationReason::new(2, "TypeCheck").with(ReasonPart::Method(method)).with(ReasonPart::Type(fx.point));

    let speculation = log.speculate(reason.clone()).unwrap();
    let found = log.lookup_speculation(&speculation.constant()).unwrap();
    assert_eq!(found.reason, reason);
    assert!(log.lookup_speculation(&JavaConstant::Long(1 << 40)).is_none());
    assert!(log.lookup_speculation(&JavaConstant::Int(0)).is_none());
}

#[test]
fn test_closed_log_refuses_new_speculations() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let log = HotSpotSpeculationLog::new(rt.context());
    let recorded = log.speculate(null_check(1)).unwrap();

    log.close();
    assert!(log.is_closed());
    assert!(matches!(log.speculate(null_check(2)), Err(JvmciError::InvalidState(_))));
    assert!(log.lookup_speculation(&recorded.constant()).is_some());
}

#[test]
fn test_failure_is_seen_by_later_logs() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();
    let first = HotSpotSpeculationLog::new(ctx);
    let speculation = first.speculate(null_check(7)).unwrap();

    assert!(first.add_failed_speculation(&speculation).unwrap());
    assert!(!first.add_failed_speculation(&speculation).unwrap(), "already listed");
    assert!(first.may_speculate(&null_check(7)), "a log keeps its view from creation");

    let second = HotSpotSpeculationLog::observing(ctx, first.failed_speculations_address());
    assert_eq!(second.failed_count(), 1);
    assert!(!second.may_speculate(&null_check(7)));
    assert!(second.may_speculate(&null_check(8)));
    assert!(matches!(second.speculate(null_check(7)), Err(JvmciError::InvalidState(_))));
}

#[test]
fn test_foreign_speculation_cannot_fail() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();
    let a = HotSpotSpeculationLog::new(ctx);
    let b = HotSpotSpeculationLog::new(ctx);
    let foreign = a.speculate(SpeculationReason::new(3, "Bounds").with(ReasonPart::Long(-1))).unwrap();

    assert!(b.add_failed_speculation(&foreign).is_err());
}

#[test]
fn test_owned_list_is_released_after_sweep() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();
    let log = HotSpotSpeculationLog::new(ctx);
    let observer = HotSpotSpeculationLog::observing(ctx, log.failed_speculations_address());
    assert_eq!(fx.host.live_speculation_lists(), 1);

    drop(observer);
    ctx.sweep();
    assert_eq!(fx.host.live_speculation_lists(), 1, "observers do not own the list");

    drop(log);
    assert_eq!(fx.host.live_speculation_lists(), 1, "release waits for a sweep");
    ctx.sweep();
    assert_eq!(fx.host.live_speculation_lists(), 0);
    assert_eq!(fx.host.bad_releases(), 0);
}
