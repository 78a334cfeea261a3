mod common;

use common::{cert, context, install, pid, products_map, world, Failure, FlagWatcher, Shared};
use entitle_compliance::{
    Callback, ChangeAwareSorter, ChangeWatcher, ComplianceConfig, ComplianceError,
    ComplianceSnapshot, InventorySync, ProductStatus, SystemStatus, WatchKind,
};
use std::cell::Cell;
use std::rc::Rc;

struct Watchers {
    product: FlagWatcher,
    entitlement: FlagWatcher,
    consumer: FlagWatcher,
}

impl Watchers {
    fn new() -> Self {
        Self {
            product: FlagWatcher::default(),
            entitlement: FlagWatcher::default(),
            consumer: FlagWatcher::default(),
        }
    }

    fn boxed(&self) -> Vec<(WatchKind, Box<dyn ChangeWatcher>)> {
        vec![
            (WatchKind::Product, Box::new(self.product.clone()) as Box<dyn ChangeWatcher>),
            (WatchKind::Entitlement, Box::new(self.entitlement.clone()) as Box<dyn ChangeWatcher>),
            (WatchKind::Consumer, Box::new(self.consumer.clone()) as Box<dyn ChangeWatcher>),
        ]
    }
}

fn sorter(world: &Shared, watchers: &Watchers) -> ChangeAwareSorter {
    ChangeAwareSorter::new(context(world), ComplianceConfig::default(), watchers.boxed()).unwrap()
}

fn counter() -> (Rc<Cell<usize>>, Callback) {
    let count = Rc::new(Cell::new(0));
    let handle = Rc::clone(&count);
    let callback: Callback = Rc::new(move || handle.set(handle.get() + 1));
    (count, callback)
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn syncs_inventory_before_first_load() {
    let w = world();
    install(&w, &["p1", "p2"]);
    let sorter = sorter(&w, &Watchers::new());

    assert_eq!(w.borrow().calls, vec!["sync", "status"]);
    assert_eq!(w.borrow().synced_products, vec![vec![pid("p1"), pid("p2")]]);
    assert!(sorter.last_sync().is_updated());
}

#[test]
fn auth_failure_during_sync_is_swallowed() {
    let w = world();
    install(&w, &["p1"]);
    w.borrow_mut().sync_failure = Some(Failure::Unauthorized);

    let sorter = sorter(&w, &Watchers::new());
    assert!(matches!(
        sorter.last_sync(),
        InventorySync::AuthFailed(ComplianceError::Unauthorized)
    ));
    assert_eq!(w.borrow().status_calls, 1);
}

#[test]
fn other_sync_failures_are_errors() {
    let w = world();
    w.borrow_mut().sync_failure = Some(Failure::Network);
    let result = ChangeAwareSorter::new(context(&w), ComplianceConfig::default(), Vec::new());
    assert!(matches!(result, Err(ComplianceError::Network(_))));
}

#[test]
fn unregistered_skips_sync() {
    let w = world();
    w.borrow_mut().registered = false;
    let sorter = sorter(&w, &Watchers::new());
    assert!(matches!(sorter.last_sync(), InventorySync::Skipped));
    assert!(w.borrow().calls.is_empty());
    assert_eq!(sorter.system_status_id(), SystemStatus::Unknown);
}

#[test]
fn sync_can_be_disabled() {
    let w = world();
    let config = ComplianceConfig {
        sync_installed_products: false,
        ..Default::default()
    };
    let sorter = ChangeAwareSorter::new(context(&w), config, Vec::new()).unwrap();
    assert!(matches!(sorter.last_sync(), InventorySync::Skipped));
    assert_eq!(w.borrow().calls, vec!["status"]);
}

// ── force_check ──────────────────────────────────────────────────

#[test]
fn force_check_without_changes_does_nothing() {
    let w = world();
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);
    let (count, cb) = counter();
    sorter.add_callback(cb);

    sorter.force_check();
    assert_eq!(count.get(), 0);
    assert_eq!(w.borrow().status_calls, 1);
}

#[test]
fn entitlement_change_refreshes_and_reloads() {
    let w = world();
    install(&w, &["p1"]);
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);
    let (count, cb) = counter();
    sorter.add_callback(cb);
    assert_eq!(sorter.product_status(&pid("p1")), ProductStatus::NotSubscribed);

    w.borrow_mut().certs.push(cert(1, 30, 60, &["p1"]));
    watchers.entitlement.trip();
    sorter.force_check();

    assert_eq!(w.borrow().entitlement_refreshes, 1);
    assert_eq!(w.borrow().status_calls, 2);
    assert_eq!(count.get(), 1);
    assert_eq!(sorter.product_status(&pid("p1")), ProductStatus::FutureSubscribed);
    assert!(sorter.has_entitlements());
}

#[test]
fn product_change_refreshes_and_resyncs() {
    let w = world();
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);

    install(&w, &["p9"]);
    watchers.product.trip();
    sorter.force_check();

    let world = w.borrow();
    assert_eq!(world.product_refreshes, 1);
    assert_eq!(world.synced_products.len(), 2);
    assert_eq!(world.synced_products[1], vec![pid("p9")]);
    assert_eq!(world.calls, vec!["sync", "status", "sync", "status"]);
}

#[test]
fn consumer_change_reloads_identity_and_resets_connection() {
    let w = world();
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);

    watchers.consumer.trip();
    sorter.force_check();

    assert_eq!(w.borrow().identity_reloads, 1);
    assert_eq!(w.borrow().connection_resets, 1);
}

#[test]
fn several_changes_notify_once() {
    let w = world();
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);
    let (count, cb) = counter();
    sorter.add_callback(cb);

    watchers.entitlement.trip();
    watchers.consumer.trip();
    sorter.force_check();

    assert_eq!(count.get(), 1);
    assert_eq!(w.borrow().status_calls, 3);
}

#[test]
fn observers_see_reloaded_state() {
    let w = world();
    let watchers = Watchers::new();
    let mut sorter = sorter(&w, &watchers);
    let seen = Rc::new(Cell::new(0));
    let world_handle = Rc::clone(&w);
    let seen_handle = Rc::clone(&seen);
    sorter.add_callback(Rc::new(move || {
        seen_handle.set(world_handle.borrow().status_calls);
    }));

    watchers.entitlement.trip();
    sorter.force_check();
    assert_eq!(seen.get(), 2);
}

#[test]
fn on_change_loads_and_notifies() {
    let w = world();
    install(&w, &["p1"]);
    let mut sorter = sorter(&w, &Watchers::new());
    let (count, cb) = counter();
    sorter.add_callback(cb);

    w.borrow_mut().snapshot = Some(ComplianceSnapshot {
        status: Some("valid".into()),
        compliant_products: products_map(&["p1"]),
        ..Default::default()
    });
    sorter.on_change();

    assert_eq!(count.get(), 1);
    assert!(sorter.is_valid());
    assert_eq!(sorter.product_status(&pid("p1")), ProductStatus::Subscribed);
}

#[test]
fn load_does_not_notify() {
    let w = world();
    let mut sorter = sorter(&w, &Watchers::new());
    let (count, cb) = counter();
    sorter.add_callback(cb);
    sorter.load();
    assert_eq!(count.get(), 0);
}

// ── Observers ────────────────────────────────────────────────────

#[test]
fn add_callback_deduplicates() {
    let w = world();
    let sorter = sorter(&w, &Watchers::new());
    let (count, cb) = counter();

    assert!(sorter.add_callback(Rc::clone(&cb)));
    assert!(!sorter.add_callback(Rc::clone(&cb)));
    sorter.notify();
    assert_eq!(count.get(), 1);
}

#[test]
fn remove_unregistered_callback_reports_failure() {
    let w = world();
    let sorter = sorter(&w, &Watchers::new());
    let (_, cb) = counter();
    assert!(!sorter.remove_callback(&cb));
    sorter.add_callback(Rc::clone(&cb));
    assert!(sorter.remove_callback(&cb));
    assert!(!sorter.remove_callback(&cb));
}

#[test]
fn removal_during_notify_keeps_current_pass() {
    let w = world();
    let sorter = sorter(&w, &Watchers::new());
    let observers = sorter.observers();

    let (b_count, b) = counter();
    let a_count = Rc::new(Cell::new(0));
    let a_handle = Rc::clone(&a_count);
    let b_target = Rc::clone(&b);
    let a: Callback = Rc::new(move || {
        a_handle.set(a_handle.get() + 1);
        observers.remove(&b_target);
    });

    sorter.add_callback(a);
    sorter.add_callback(b);

    sorter.notify();
    assert_eq!(a_count.get(), 1);
    assert_eq!(b_count.get(), 1);

    sorter.notify();
    assert_eq!(a_count.get(), 2);
    assert_eq!(b_count.get(), 1);
}

#[test]
fn addition_during_notify_waits_for_next_pass() {
    let w = world();
    let sorter = sorter(&w, &Watchers::new());
    let observers = sorter.observers();

    let (late_count, late) = counter();
    let adder: Callback = Rc::new(move || {
        observers.add(Rc::clone(&late));
    });
    sorter.add_callback(adder);

    sorter.notify();
    assert_eq!(late_count.get(), 0);
    sorter.notify();
    assert_eq!(late_count.get(), 1);
}

#[test]
fn has_entitlements_tracks_store() {
    let w = world();
    let sorter = sorter(&w, &Watchers::new());
    assert!(!sorter.has_entitlements());
    w.borrow_mut().certs.push(cert(1, -1, 1, &["p1"]));
    assert!(sorter.has_entitlements());
}
