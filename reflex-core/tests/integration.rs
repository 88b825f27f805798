//! Integration Tests for Reactive System
//!
//! These tests verify that observables, effects, computeds, and watchers work
//! together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reflex_core::reactive::{Flush, OnInvalidate, Runtime, WatchOptions, WatchSource};
use reflex_core::schedule::LocalTaskScheduler;
use reflex_core::store::FieldKey;
use reflex_core::value::{RawObject, Value};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Cell<usize>) {
    count.set(count.get() + 1);
}

/// Writing a field no effect reads re-runs nothing.
#[test]
fn unread_fields_trigger_nothing() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 1), ("b", 2)]));
    let runs = counter();

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        bump(&runs_clone);
        reader.get("a");
    });

    obj.set("b", 20).unwrap();
    obj.set("c", 30).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(rt.subscriber_count(&obj, &FieldKey::field("b")), 0);
}

/// A field the effect stopped reading no longer re-runs it.
#[test]
fn stale_subscriptions_are_removed_each_run() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", Value::from(true)), ("b", Value::from(0))]));
    let runs = counter();

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let effect = rt.effect(move || {
        bump(&runs_clone);
        if reader.get("a").as_bool() == Some(true) {
            reader.get("b");
        }
    });
    assert_eq!(effect.dependency_count(), 2);

    obj.set("a", false).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(effect.dependency_count(), 1);

    obj.set("b", 1).unwrap();
    assert_eq!(runs.get(), 2);
}

/// An effect that increments a field it reads runs once, not forever.
#[test]
fn self_increment_runs_once() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("count", 0)]));
    let runs = counter();

    let target = obj.clone();
    let runs_clone = runs.clone();
    let effect = rt.effect(move || {
        bump(&runs_clone);
        let next = target.get("count").as_f64().unwrap_or(0.0) + 1.0;
        target.set("count", next).unwrap();
    });

    assert_eq!(runs.get(), 1);
    assert_eq!(obj.raw().get("count").as_f64(), Some(1.0));

    effect.run();
    assert_eq!(runs.get(), 2);
    assert_eq!(obj.raw().get("count").as_f64(), Some(2.0));
}

/// Enumeration re-runs on added keys but not on overwrites.
#[test]
fn enumeration_reacts_to_key_set_changes_only() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("existing", 1)]));
    let runs = counter();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let seen_clone = seen.clone();
    let _effect = rt.effect(move || {
        bump(&runs_clone);
        *seen_clone.borrow_mut() = reader.keys();
    });

    obj.set("existing", 2).unwrap();
    assert_eq!(runs.get(), 1);

    obj.set("added", 1).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(*seen.borrow(), vec!["existing", "added"]);

    obj.delete("existing").unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(*seen.borrow(), vec!["added"]);
}

/// An effect that both enumerates and reads a field re-runs on overwrite
/// through the field, once.
#[test]
fn enumeration_and_field_read_dedupe() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 1)]));
    let runs = counter();

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        bump(&runs_clone);
        for key in reader.keys() {
            reader.get(&key);
        }
    });

    obj.set("a", 2).unwrap();
    assert_eq!(runs.get(), 2);

    obj.set("b", 1).unwrap();
    assert_eq!(runs.get(), 3);
}

/// The getter runs once per change, and so does an effect reading it.
#[test]
fn computed_evaluates_lazily_and_once() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 1), ("b", 2)]));
    let evaluations = counter();

    let reader = obj.clone();
    let evaluations_clone = evaluations.clone();
    let sum = rt.computed(move || {
        bump(&evaluations_clone);
        reader.get("a").as_f64().unwrap_or(0.0) + reader.get("b").as_f64().unwrap_or(0.0)
    });

    assert_eq!(sum.get(), 3.0);
    assert_eq!(sum.get(), 3.0);
    assert_eq!(evaluations.get(), 1);

    let runs = counter();
    let observed = Rc::new(Cell::new(0.0));
    let sum_reader = sum.clone();
    let runs_clone = runs.clone();
    let observed_clone = observed.clone();
    let _effect = rt.effect(move || {
        bump(&runs_clone);
        observed_clone.set(sum_reader.get());
    });
    assert_eq!(runs.get(), 1);

    obj.set("a", 10).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(observed.get(), 12.0);
    assert_eq!(evaluations.get(), 2);

    assert_eq!(sum.get(), 12.0);
    assert_eq!(evaluations.get(), 2);
}

/// An effect reading a field and a computed over that field sees a
/// consistent pair, once.
#[test]
fn effect_reading_field_and_computed_runs_once() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("count", 1)]));

    let reader = obj.clone();
    let doubled = rt.computed(move || reader.get("count").as_f64().unwrap_or(0.0) * 2.0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let reader = obj.clone();
    let seen_clone = seen.clone();
    let _effect = rt.effect(move || {
        let count = reader.get("count").as_f64().unwrap_or(0.0);
        seen_clone.borrow_mut().push((count, doubled.get()));
    });

    obj.set("count", 5).unwrap();
    assert_eq!(*seen.borrow(), vec![(1.0, 2.0), (5.0, 10.0)]);
}

/// An effect reading two computeds over the same field re-runs once and
/// never sees one fresh and one stale.
#[test]
fn effect_reading_two_computeds_runs_once() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 1)]));

    let reader = obj.clone();
    let doubled = rt.computed(move || reader.get("a").as_f64().unwrap_or(0.0) * 2.0);
    let reader = obj.clone();
    let tripled = rt.computed(move || reader.get("a").as_f64().unwrap_or(0.0) * 3.0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let _effect = rt.effect(move || {
        seen_clone.borrow_mut().push((doubled.get(), tripled.get()));
    });

    obj.set("a", 2).unwrap();
    assert_eq!(*seen.borrow(), vec![(2.0, 3.0), (4.0, 6.0)]);
}

/// A deep sync watcher fires once per nested write with the top-level
/// object as both values.
#[test]
fn deep_sync_watch_fires_once_per_write() {
    let rt = Runtime::new();
    let raw = RawObject::from_json_str(r#"{ "user": { "profile": { "name": "ada" } } }"#).unwrap();
    let obj = rt.wrap(raw.clone());
    let calls = Rc::new(RefCell::new(Vec::<(Value, Value)>::new()));

    let sink = calls.clone();
    let _handle = rt.watch(
        &obj,
        move |new: &Value, old: &Value, _: &OnInvalidate| sink.borrow_mut().push((new.clone(), old.clone())),
        WatchOptions::default(),
    );

    let profile = obj.child("user").and_then(|user| user.child("profile")).unwrap();
    profile.set("name", "grace").unwrap();

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.as_object().unwrap().ptr_eq(&raw));
    assert!(calls[0].1.as_object().unwrap().ptr_eq(&raw));
}

/// Post flush coalesces a burst of writes into one callback per flush.
#[test]
fn deep_post_watch_coalesces_until_flush() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_json_str(r#"{ "a": { "x": 0 }, "b": 0 }"#).unwrap());
    let calls = counter();

    let calls_clone = calls.clone();
    let _handle = rt.watch(
        &obj,
        move |_: &Value, _: &Value, _: &OnInvalidate| bump(&calls_clone),
        WatchOptions::post(),
    );

    obj.child("a").unwrap().set("x", 1).unwrap();
    obj.set("b", 1).unwrap();
    obj.set("c", 1).unwrap();
    assert_eq!(calls.get(), 0);

    rt.flush_post_jobs().unwrap();
    assert_eq!(calls.get(), 1);

    rt.flush_post_jobs().unwrap();
    assert_eq!(calls.get(), 1);
}

/// Post jobs run on a tokio local task when that scheduler is installed.
#[tokio::test(flavor = "current_thread")]
async fn post_watch_flushes_on_local_task() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let rt = Runtime::new().with_post_scheduler(Rc::new(LocalTaskScheduler::new()));
            let obj = rt.wrap(RawObject::from_fields([("a", 0)]));
            let last = Rc::new(Cell::new(0.0));

            let reader = obj.clone();
            let last_clone = last.clone();
            let _handle = rt.watch(
                WatchSource::getter(move || reader.get("a")),
                move |new: &Value, _: &Value, _: &OnInvalidate| last_clone.set(new.as_f64().unwrap_or_default()),
                WatchOptions {
                    immediate: false,
                    flush: Flush::Post,
                },
            );

            obj.set("a", 1).unwrap();
            obj.set("a", 2).unwrap();
            assert_eq!(last.get(), 0.0);

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(last.get(), 2.0);
        })
        .await;
}

/// Superseded async work is cancelled through the invalidation callback.
#[test]
fn invalidation_cancels_superseded_work() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("query", "a")]));
    let cancelled = Rc::new(RefCell::new(Vec::new()));

    let reader = obj.clone();
    let cancelled_clone = cancelled.clone();
    let handle = rt.watch(
        WatchSource::getter(move || reader.get("query")),
        move |new: &Value, _: &Value, on_invalidate: &OnInvalidate| {
            let query = new.as_str().unwrap_or_default().to_string();
            let cancelled = cancelled_clone.clone();
            on_invalidate.register(move || cancelled.borrow_mut().push(query));
        },
        WatchOptions::immediate(),
    );

    obj.set("query", "ab").unwrap();
    obj.set("query", "abc").unwrap();
    assert_eq!(*cancelled.borrow(), vec!["a", "ab"]);

    handle.stop();
    assert_eq!(*cancelled.borrow(), vec!["a", "ab", "abc"]);

    obj.set("query", "abcd").unwrap();
    assert_eq!(cancelled.borrow().len(), 3);
}

/// Writing NaN over NaN is not a change.
#[test]
fn nan_overwrite_is_silent() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::new());
    let runs = counter();

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        bump(&runs_clone);
        reader.get("x");
    });

    obj.set("x", f64::NAN).unwrap();
    assert_eq!(runs.get(), 2);

    obj.set("x", f64::NAN).unwrap();
    assert_eq!(runs.get(), 2);
}

/// One failing effect does not block the others in the same trigger.
#[test]
fn failing_effect_is_isolated() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 0)]));
    let runs = counter();

    let reader = obj.clone();
    let failing = rt.effect(move || {
        if reader.get("a").as_f64() == Some(1.0) {
            panic!("bad value");
        }
    });

    let reader = obj.clone();
    let runs_clone = runs.clone();
    let _healthy = rt.effect(move || {
        bump(&runs_clone);
        reader.get("a");
    });

    let err = obj.set("a", 1).unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].effect, failing.id());
    assert_eq!(runs.get(), 2);
    assert!(!rt.is_tracking());
}

/// Runtimes are independent of each other.
#[test]
fn runtimes_do_not_share_state() {
    let first = Runtime::new();
    let second = Runtime::new();
    let raw = RawObject::from_fields([("a", 0)]);
    let runs = counter();

    let reader = first.wrap(raw.clone());
    let runs_clone = runs.clone();
    let _effect = first.effect(move || {
        bump(&runs_clone);
        reader.get("a");
    });

    second.wrap(raw.clone()).set("a", 1).unwrap();
    assert_eq!(runs.get(), 1);

    first.wrap(raw).set("a", 2).unwrap();
    assert_eq!(runs.get(), 2);
}

/// An object captured only by an effect's closure is freed once the effect's
/// last handle is dropped, and the next sweep evicts its entry.
#[test]
fn dropped_effect_releases_captured_object() {
    let rt = Runtime::new();
    let obj = rt.wrap(RawObject::from_fields([("a", 0)]));
    let weak = obj.raw().downgrade();

    let reader = obj.clone();
    let effect = rt.effect(move || {
        reader.get("a");
    });
    drop(obj);
    assert!(weak.is_alive());
    assert_eq!(rt.tracked_targets(), 1);

    drop(effect);
    assert!(!weak.is_alive());
    assert_eq!(rt.sweep(), 1);
    assert_eq!(rt.tracked_targets(), 0);
}
