//! Shared fakes for compliance tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use entitle_compliance::{
    ChangeWatcher, ComplianceContext, ComplianceError, ComplianceResult, ComplianceSnapshot,
    ConnectionProvider, EntitlementCertificate, EntitlementSource, IdentitySource,
    InstalledProduct, Order, ProductInventory, ServerConnection,
};
use entitle_types::{ConsumerId, ProductId, StackId, ValidityRange};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// How a fake server call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unauthorized,
    Network,
}

impl Failure {
    fn to_error(self) -> ComplianceError {
        match self {
            Self::Unauthorized => ComplianceError::Unauthorized,
            Self::Network => ComplianceError::Network("connection refused".into()),
        }
    }
}

/// Local machine plus server state shared by all fakes.
#[derive(Debug)]
pub struct World {
    pub installed: BTreeMap<ProductId, InstalledProduct>,
    pub certs: Vec<EntitlementCertificate>,
    pub registered: bool,
    pub consumer: ConsumerId,
    pub snapshot: Option<ComplianceSnapshot>,
    pub reachable: bool,
    pub sca: bool,
    pub sca_failure: Option<Failure>,
    pub connect_failure: Option<Failure>,
    pub sync_failure: Option<Failure>,
    pub synced_products: Vec<Vec<ProductId>>,
    pub status_calls: usize,
    pub calls: Vec<&'static str>,
    pub on_dates: Vec<Option<DateTime<Utc>>>,
    pub product_refreshes: usize,
    pub entitlement_refreshes: usize,
    pub identity_reloads: usize,
    pub connection_resets: usize,
}

impl Default for World {
    fn default() -> Self {
        Self {
            installed: BTreeMap::new(),
            certs: Vec::new(),
            registered: true,
            consumer: ConsumerId::new(),
            snapshot: Some(ComplianceSnapshot::default()),
            reachable: true,
            sca: false,
            sca_failure: None,
            connect_failure: None,
            sync_failure: None,
            synced_products: Vec::new(),
            status_calls: 0,
            calls: Vec::new(),
            on_dates: Vec::new(),
            product_refreshes: 0,
            entitlement_refreshes: 0,
            identity_reloads: 0,
            connection_resets: 0,
        }
    }
}

pub type Shared = Rc<RefCell<World>>;

pub fn world() -> Shared {
    init_tracing();
    Rc::new(RefCell::new(World::default()))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct FakeInventory(pub Shared);

impl ProductInventory for FakeInventory {
    fn list_installed(&self) -> BTreeMap<ProductId, InstalledProduct> {
        self.0.borrow().installed.clone()
    }

    fn find_by_product(&self, id: &ProductId) -> Option<InstalledProduct> {
        self.0.borrow().installed.get(id).cloned()
    }

    fn refresh(&mut self) {
        self.0.borrow_mut().product_refreshes += 1;
    }
}

pub struct FakeEntitlements(pub Shared);

impl EntitlementSource for FakeEntitlements {
    fn list(&self) -> Vec<EntitlementCertificate> {
        self.0.borrow().certs.clone()
    }

    fn refresh(&mut self) {
        self.0.borrow_mut().entitlement_refreshes += 1;
    }
}

pub struct FakeIdentity(pub Shared);

impl IdentitySource for FakeIdentity {
    fn is_registered(&self) -> bool {
        self.0.borrow().registered
    }

    fn consumer_id(&self) -> Option<ConsumerId> {
        let world = self.0.borrow();
        world.registered.then_some(world.consumer)
    }

    fn reload(&mut self) {
        self.0.borrow_mut().identity_reloads += 1;
    }
}

pub struct FakeConnection(pub Shared);

impl ServerConnection for FakeConnection {
    fn compliance_status(
        &self,
        _consumer: ConsumerId,
        on_date: Option<DateTime<Utc>>,
    ) -> ComplianceResult<Option<ComplianceSnapshot>> {
        let mut world = self.0.borrow_mut();
        world.status_calls += 1;
        world.calls.push("status");
        world.on_dates.push(on_date);
        if !world.reachable {
            return Err(ComplianceError::Network("connection refused".into()));
        }
        Ok(world.snapshot.clone())
    }

    fn is_simple_content_access(&self, _consumer: ConsumerId) -> ComplianceResult<bool> {
        let world = self.0.borrow();
        match world.sca_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(world.sca),
        }
    }

    fn update_installed_products(
        &self,
        _consumer: ConsumerId,
        products: &[InstalledProduct],
    ) -> ComplianceResult<()> {
        let mut world = self.0.borrow_mut();
        world.calls.push("sync");
        if let Some(failure) = world.sync_failure {
            return Err(failure.to_error());
        }
        world
            .synced_products
            .push(products.iter().map(|p| p.id.clone()).collect());
        Ok(())
    }
}

pub struct FakeConnections(pub FakeConnection);

impl ConnectionProvider for FakeConnections {
    fn connection(&mut self) -> ComplianceResult<&dyn ServerConnection> {
        if let Some(failure) = (self.0).0.borrow().connect_failure {
            return Err(failure.to_error());
        }
        Ok(&self.0)
    }

    fn reset(&mut self) {
        (self.0).0.borrow_mut().connection_resets += 1;
    }
}

pub fn context(world: &Shared) -> ComplianceContext {
    ComplianceContext::new(
        Box::new(FakeInventory(Rc::clone(world))),
        Box::new(FakeEntitlements(Rc::clone(world))),
        Box::new(FakeIdentity(Rc::clone(world))),
        Box::new(FakeConnections(FakeConnection(Rc::clone(world)))),
    )
}

/// Watcher whose next poll result is set by the test.
#[derive(Clone, Default)]
pub struct FlagWatcher(pub Rc<Cell<bool>>);

impl FlagWatcher {
    pub fn trip(&self) {
        self.0.set(true);
    }
}

impl ChangeWatcher for FlagWatcher {
    fn poll(&mut self) -> bool {
        self.0.replace(false)
    }
}

// ── Builders ─────────────────────────────────────────────────────

pub fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

pub fn install(world: &Shared, ids: &[&str]) {
    let mut w = world.borrow_mut();
    for id in ids {
        w.installed.insert(
            pid(id),
            InstalledProduct::new(*id)
                .with_name(format!("Product {id}"))
                .with_version("1.0", "x86_64"),
        );
    }
}

/// A certificate valid from `now + begin_days` to `now + end_days`.
pub fn cert(serial: u64, begin_days: i64, end_days: i64, products: &[&str]) -> EntitlementCertificate {
    let now = Utc::now();
    let validity =
        ValidityRange::new(now + Duration::days(begin_days), now + Duration::days(end_days)).unwrap();
    EntitlementCertificate::new(serial, validity, products.iter().map(|p| pid(p)).collect())
}

pub fn stacked_cert(serial: u64, stack: Option<&str>, name: &str) -> EntitlementCertificate {
    cert(serial, -10, 10, &["69"]).with_order(Order {
        name: Some(name.to_string()),
        stacking_id: stack.map(StackId::from),
        warning_period_days: 0,
    })
}

pub fn payload(serial: u64) -> serde_json::Value {
    serde_json::json!({ "id": format!("ent-{serial}"), "certificates": [{ "serial": { "serial": serial } }] })
}

pub fn products_map(ids: &[&str]) -> BTreeMap<ProductId, Vec<serde_json::Value>> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (pid(id), vec![payload(i as u64)]))
        .collect()
}
