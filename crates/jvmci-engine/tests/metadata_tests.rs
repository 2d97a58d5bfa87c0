//! Metadata Wrapper Tests
//!
//! Identity of class, method and field wrappers, lazy accessors, and the
//! handle lifecycle behind them:
//! - One wrapper per native handle while any owner is alive
//! - Every pin released exactly once, however sweeps interleave
//! - Unloaded classes stay unresolved until explicitly resolved

mod common;

use std::sync::Arc;
use std::thread;

use common::{runtime, Fixture};
use jvmci_engine::meta::JavaKind;
use jvmci_engine::{JavaType, NativeHost};

#[test]
fn test_wrappers_are_identical_while_alive() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let a = ctx.resolved_type(fx.point);
    let b = ctx.resolved_type(fx.point);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "p/Point");

    let looked_up = ctx.lookup_type("p/Point", None, false).unwrap();
    assert_eq!(looked_up, JavaType::Resolved(a.clone()));

    let method = fx.host.method(fx.point, "length", "()D").unwrap();
    let m1 = ctx.resolved_method(method).unwrap();
    let m2 = ctx.resolved_method(method).unwrap();
    assert!(Arc::ptr_eq(&m1, &m2));
    assert!(Arc::ptr_eq(&m1.holder(ctx), &a));
}

#[test]
fn test_dead_wrappers_release_their_pins() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let ty = ctx.resolved_type(fx.point);
    let method = ctx.resolved_method(fx.host.method(fx.point, "origin", "()Lp/Point;").unwrap()).unwrap();
    assert_eq!(fx.host.live_metadata_handles(), 2);

    drop(ty);
    drop(method);
    assert_eq!(fx.host.live_metadata_handles(), 2, "release waits for a sweep");
    assert_eq!(ctx.sweep(), 2);
    assert_eq!(fx.host.live_metadata_handles(), 0);
    assert_eq!(ctx.cached_wrapper_count(), 0);

    let rebuilt = ctx.resolved_type(fx.point);
    assert_eq!(rebuilt.name(), "p/Point");
    assert_eq!(fx.host.live_metadata_handles(), 1);
    assert_eq!(fx.host.bad_releases(), 0);
}

#[test]
fn test_concurrent_sweeps_release_exactly_once() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();
    let klasses = [
        fx.object,
        fx.point,
        fx.host.klass_named("java/lang/String").unwrap(),
        fx.host.klass_named("java/lang/Class").unwrap(),
    ];
    let methods = [
        fx.host.method(fx.point, "length", "()D").unwrap(),
        fx.host.method(fx.point, "scale", "(I)V").unwrap(),
    ];

    thread::scope(|s| {
        for t in 0..8 {
            s.spawn(move || {
                for i in 0..300 {
                    let ty = ctx.resolved_type(klasses[(t + i) % klasses.len()]);
                    let method = ctx.resolved_method(methods[i % methods.len()]).unwrap();
                    assert!(!ty.name().is_empty());
                    drop(method);
                    drop(ty);
                    if i % 7 == 0 {
                        ctx.sweep();
                    }
                }
            });
        }
    });

    ctx.sweep();
    assert_eq!(fx.host.bad_releases(), 0);
    assert_eq!(fx.host.live_metadata_handles(), 0);
    assert_eq!(ctx.cleaner().tracked_count(), 0);
}

#[test]
fn test_unloaded_type_stays_unresolved_until_resolved() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let lazy = ctx.lookup_type("p/Lazy", None, false).unwrap();
    assert!(!lazy.is_resolved());
    assert_eq!(lazy.name(), "p/Lazy");

    let resolved = ctx.lookup_type("p/Lazy", None, true).unwrap();
    assert!(resolved.is_resolved());
    assert!(ctx.lookup_type("p/Lazy", None, false).unwrap().is_resolved());
    assert!(fx.host.is_loaded(fx.lazy));

    assert!(ctx.lookup_type("q/Nowhere", None, true).is_err());
    assert_eq!(ctx.lookup_type("I", None, false).unwrap(), JavaType::Primitive(JavaKind::Int));
}

#[test]
fn test_type_accessors() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let point = ctx.resolved_type(fx.point);
    let object = ctx.resolved_type(fx.object);
    assert!(object.is_assignable_from(ctx, &point));
    assert!(!point.is_assignable_from(ctx, &object));
    assert!(Arc::ptr_eq(&point.super_class(ctx).unwrap(), &object));
    assert!(object.super_class(ctx).is_none());

    let fields: Vec<_> = point.instance_fields(ctx).iter().map(|f| f.name().to_string()).collect();
    assert_eq!(fields, vec!["x", "y"]);
    let x = &point.instance_fields(ctx)[0];
    assert_eq!(x.offset(), 12);
    assert_eq!(x.kind(), JavaKind::Int);
    assert!(Arc::ptr_eq(&x.holder(ctx), &point));

    let pool = point.constant_pool(ctx).unwrap();
    assert_eq!(pool.pointer(), fx.pool.pointer);
    assert!(Arc::ptr_eq(&pool, &ctx.constant_pool(fx.pool.pointer)));
    assert!(Arc::ptr_eq(&pool.holder(ctx), &point));
}

#[test]
fn test_method_accessors() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let length = ctx.resolved_method(fx.host.method(fx.point, "length", "()D").unwrap()).unwrap();
    assert_eq!(length.name(), "length");
    assert_eq!(length.signature().descriptor(), "()D");
    assert_eq!(length.code(ctx), &[0x0e, 0xaf]);
    assert_eq!(length.code_size(), 2);
    assert_eq!(length.max_locals(), 1);
    assert_eq!(length.line_number_at(ctx, 1), Some(10));
    assert_eq!(length.local_variable_table(ctx)[0].name, "this");
    assert!(length.exception_handlers(ctx).is_empty());
    assert!(!length.is_static());

    let origin = ctx.resolved_method(fx.host.method(fx.point, "origin", "()Lp/Point;").unwrap()).unwrap();
    assert!(origin.is_static());
}

#[test]
fn test_initialization_is_reported() {
    let fx = Fixture::new();
    let rt = runtime(&fx.host);
    let ctx = rt.context();

    let point = ctx.resolved_type(fx.point);
    assert!(!point.is_initialized(ctx));
    point.initialize(ctx).unwrap();
    assert!(point.is_initialized(ctx));
    assert!(fx.host.is_initialized(fx.object));
}
