//! Integration Tests for the Selector Store
//!
//! These tests drive the store the way a host would: through the publisher
//! and subscriber halves, and through per-unit bindings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use prism_core::binding::{RenderQueue, UnitId};
use prism_core::store::{create_store, Equality, ObserverHandle, StoreError};

#[derive(Debug, Clone)]
struct Bar {
    baz: String,
}

#[derive(Debug, Clone)]
struct State {
    foo: String,
    bar: Arc<Bar>,
}

fn initial() -> State {
    State {
        foo: "foo".to_string(),
        bar: Arc::new(Bar {
            baz: "baz".to_string(),
        }),
    }
}

/// Callback that records the observer's value each time it fires.
fn recorder<G: Clone + Send + Sync + 'static>(
    handle: &Arc<Mutex<Option<ObserverHandle<State, G>>>>,
) -> (Arc<Mutex<Vec<G>>>, impl Fn() + Send + Sync + 'static) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let fired_clone = fired.clone();
    let handle = handle.clone();
    (fired, move || {
        if let Some(handle) = handle.lock().as_ref() {
            fired_clone.lock().push(handle.get());
        }
    })
}

/// Changing `foo` fires the `foo` observer with the new value and leaves the
/// `bar.baz` observer alone.
#[test]
fn only_the_changed_slice_fires() {
    let (publisher, subscriber) = create_store(initial());

    let a_slot = Arc::new(Mutex::new(None));
    let (a_fired, a_cb) = recorder::<String>(&a_slot);
    *a_slot.lock() = Some(subscriber.select(|s: &State| s.foo.clone(), a_cb).unwrap());

    let b_slot = Arc::new(Mutex::new(None));
    let (b_fired, b_cb) = recorder::<String>(&b_slot);
    *b_slot.lock() = Some(subscriber.select(|s: &State| s.bar.baz.clone(), b_cb).unwrap());

    publisher
        .publish(State {
            foo: "fooo".to_string(),
            bar: Arc::new(Bar {
                baz: "baz".to_string(),
            }),
        })
        .unwrap();

    assert_eq!(*a_fired.lock(), vec!["fooo".to_string()]);
    assert!(b_fired.lock().is_empty());
}

/// A freshly allocated top-level value that reuses the `bar` reference keeps
/// a reference-compared `bar` observer quiet.
#[test]
fn shared_branch_reference_keeps_observer_quiet() {
    let (publisher, subscriber) = create_store(initial());
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    let _observer = subscriber
        .select(|s: &State| Arc::clone(&s.bar), move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let current = subscriber.current_value().unwrap();
    publisher
        .publish(State {
            foo: current.foo.clone(),
            bar: Arc::clone(&current.bar),
        })
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

/// A producer that deep clones defeats identity comparison; a structural
/// policy restores the expected behavior.
#[test]
fn deep_clone_fires_identity_but_not_structural() {
    let (publisher, subscriber) = create_store(initial());
    let identity_count = Arc::new(AtomicUsize::new(0));
    let structural_count = Arc::new(AtomicUsize::new(0));

    let identity_clone = identity_count.clone();
    let _observer = subscriber
        .select(|s: &State| Arc::clone(&s.bar), move || {
            identity_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let structural_clone = structural_count.clone();
    let _observer = subscriber
        .select_with(
            |s: &State| Arc::clone(&s.bar),
            Equality::new(|a: &Arc<Bar>, b: &Arc<Bar>| a.baz == b.baz),
            move || {
                structural_clone.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

    let current = subscriber.current_value().unwrap();
    publisher
        .publish(State {
            foo: current.foo.clone(),
            bar: Arc::new((*current.bar).clone()),
        })
        .unwrap();

    assert_eq!(identity_count.load(Ordering::SeqCst), 1);
    assert_eq!(structural_count.load(Ordering::SeqCst), 0);
}

/// Subscribing then unsubscribing before any publish leaves nothing to touch.
#[test]
fn subscribe_then_unsubscribe_touches_nothing() {
    let (publisher, subscriber) = create_store(initial());
    let handle = subscriber.select(|s: &State| s.foo.clone(), || {}).unwrap();
    subscriber.unsubscribe(&handle).unwrap();

    let report = publisher
        .publish(State {
            foo: "fooo".to_string(),
            ..initial()
        })
        .unwrap();
    assert_eq!(report.evaluated, 0);
    assert_eq!(report.notified, 0);
}

/// After unsubscribe an observer never fires again, however many publishes
/// follow.
#[test]
fn unsubscribed_observer_never_fires() {
    let (publisher, subscriber) = create_store(0_u32);
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    let handle = subscriber
        .select(|v: &u32| *v, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    publisher.publish(1).unwrap();
    handle.unsubscribe();
    for v in 2..10 {
        publisher.publish(v).unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// An observer's value always matches its projection of the latest value at
/// the time its callback fired.
#[test]
fn observer_value_tracks_latest_publish() {
    let (publisher, subscriber) = create_store(0_i64);
    let slot: Arc<Mutex<Option<ObserverHandle<i64, i64>>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let slot_clone = slot.clone();
    let seen_clone = seen.clone();
    let sub_clone = subscriber.clone();
    *slot.lock() = Some(
        subscriber
            .select(|v: &i64| v / 3, move || {
                let handle = slot_clone.lock();
                let handle = handle.as_ref().unwrap();
                let latest = *sub_clone.current_value().unwrap();
                assert_eq!(handle.get(), latest / 3);
                seen_clone.lock().push(handle.get());
            })
            .unwrap(),
    );

    for v in [1, 2, 3, 4, 7, 8, 9, 9, 0] {
        publisher.publish(v).unwrap();
    }

    // Fires only when `v / 3` changes: 3 -> 1, 7 -> 2, 9 -> 3, 0 -> 0.
    assert_eq!(*seen.lock(), vec![1, 2, 3, 0]);
}

/// Double unsubscribe and unsubscribe after teardown are no-ops.
#[test]
fn lifecycle_races_are_noops() {
    let (publisher, subscriber) = create_store(initial());
    let first = subscriber.select(|s: &State| s.foo.clone(), || {}).unwrap();
    let second = subscriber.select(|s: &State| s.foo.clone(), || {}).unwrap();

    subscriber.unsubscribe(&first).unwrap();
    subscriber.unsubscribe(&first).unwrap();

    publisher.teardown();
    subscriber.unsubscribe(&second).unwrap();
    second.unsubscribe();

    assert!(matches!(
        publisher.publish(initial()),
        Err(StoreError::InvalidState { .. })
    ));
}

/// Handles from one store are rejected by another.
#[test]
fn cross_store_handles_are_rejected() {
    let (_, left) = create_store(initial());
    let (_, right) = create_store(initial());
    let handle = left.select(|s: &State| s.foo.clone(), || {}).unwrap();

    assert!(matches!(
        right.unsubscribe(&handle),
        Err(StoreError::ForeignHandle { .. })
    ));
    assert!(handle.is_active());
}

/// A panicking projection is isolated: the publish completes, other
/// observers update, and the fault is reported.
#[test]
fn panicking_projection_does_not_block_others() {
    let (publisher, subscriber) = create_store(initial());
    let bad = subscriber
        .select(
            |s: &State| {
                if s.foo.len() > 3 {
                    panic!("foo too long");
                }
                s.foo.clone()
            },
            || {},
        )
        .unwrap();
    let good = subscriber.select(|s: &State| s.foo.clone(), || {}).unwrap();

    let report = publisher
        .publish(State {
            foo: "fooo".to_string(),
            ..initial()
        })
        .unwrap();

    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].observer, bad.id());
    assert_eq!(report.faults[0].message, "foo too long");
    assert_eq!(bad.get(), "foo");
    assert_eq!(good.get(), "fooo");
}

/// Two host units bound to the same store re-render independently, once per
/// wave.
#[test]
fn units_rerender_independently() {
    let (publisher, subscriber) = create_store(initial());
    let queue = RenderQueue::new();

    let header = UnitId::new();
    let header_binding = subscriber.bind(queue.invalidator(header));
    let footer = UnitId::new();
    let footer_binding = subscriber.bind(queue.invalidator(footer));

    let render_header = || {
        header_binding.render(|b| {
            let foo = b.select(|s: &State| s.foo.clone()).unwrap();
            let baz = b.select(|s: &State| s.bar.baz.clone()).unwrap();
            format!("{foo}{baz}")
        })
    };
    let render_footer =
        || footer_binding.render(|b| b.select(|s: &State| s.bar.baz.clone()).unwrap());

    assert_eq!(render_header(), "foobaz");
    assert_eq!(render_footer(), "baz");

    publisher
        .update(|s| State {
            foo: format!("{}o", s.foo),
            bar: Arc::clone(&s.bar),
        })
        .unwrap();
    assert_eq!(queue.drain(), vec![header]);
    assert_eq!(render_header(), "fooobaz");

    publisher
        .update(|s| State {
            foo: s.foo.clone(),
            bar: Arc::new(Bar {
                baz: format!("{}z", s.bar.baz),
            }),
        })
        .unwrap();
    let mut wave = queue.drain();
    wave.sort_by_key(|unit| unit.raw());
    let mut expected = vec![header, footer];
    expected.sort_by_key(|unit| unit.raw());
    assert_eq!(wave, expected);
    assert_eq!(render_footer(), "bazz");

    drop(header_binding);
    drop(footer_binding);
    assert_eq!(subscriber.store().observer_count(), 0);
}
