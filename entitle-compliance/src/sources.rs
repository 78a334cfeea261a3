//! Collaborator interfaces.
//!
//! The compliance core never touches disk or network itself. Everything it
//! reads comes through these traits, bundled into a [`ComplianceContext`]
//! that is handed to the constructor.

use crate::certificate::{EntitlementCertificate, InstalledProduct};
use crate::error::ComplianceResult;
use crate::snapshot::ComplianceSnapshot;
use chrono::{DateTime, Utc};
use entitle_types::{ConsumerId, ProductId};
use std::collections::BTreeMap;
use tracing::warn;

/// Installed product inventory (the product certificate directory).
pub trait ProductInventory {
    /// All installed products keyed by product ID.
    fn list_installed(&self) -> BTreeMap<ProductId, InstalledProduct>;

    /// Looks up one installed product.
    fn find_by_product(&self, id: &ProductId) -> Option<InstalledProduct>;

    /// Drops cached state and rereads the inventory.
    fn refresh(&mut self);
}

/// Local entitlement certificate store.
pub trait EntitlementSource {
    /// All entitlement certificates, in store order.
    fn list(&self) -> Vec<EntitlementCertificate>;

    /// Drops cached state and rereads the store.
    fn refresh(&mut self);
}

/// The consumer identity of this machine.
pub trait IdentitySource {
    /// Returns true if the machine holds a usable consumer identity.
    fn is_registered(&self) -> bool;

    /// The consumer ID, when registered.
    fn consumer_id(&self) -> Option<ConsumerId>;

    /// Rereads the identity from its backing store.
    fn reload(&mut self);
}

/// An authenticated connection to the entitlement authority.
pub trait ServerConnection {
    /// Asks the authority for the consumer's compliance verdict at `on_date`
    /// (now when `None`). `Ok(None)` means the authority had nothing to say.
    fn compliance_status(
        &self,
        consumer: ConsumerId,
        on_date: Option<DateTime<Utc>>,
    ) -> ComplianceResult<Option<ComplianceSnapshot>>;

    /// Returns true if the consumer's owner runs in Simple Content Access mode.
    fn is_simple_content_access(&self, consumer: ConsumerId) -> ComplianceResult<bool>;

    /// Pushes the local installed product list to the authority.
    fn update_installed_products(
        &self,
        consumer: ConsumerId,
        products: &[InstalledProduct],
    ) -> ComplianceResult<()>;
}

/// Hands out the consumer-authenticated connection.
pub trait ConnectionProvider {
    /// Returns the current connection, creating it if needed.
    fn connection(&mut self) -> ComplianceResult<&dyn ServerConnection>;

    /// Forgets the current connection (e.g. after the identity changed).
    fn reset(&mut self);
}

/// Where compliance verdicts come from.
///
/// Implementations may sit in front of a response cache; the core only
/// sees "a snapshot" or "nothing new".
pub trait StatusSource {
    /// Returns the verdict for `consumer` at `on_date`, or `None` when no
    /// verdict is available.
    fn fetch(
        &mut self,
        connection: &dyn ServerConnection,
        consumer: ConsumerId,
        on_date: Option<DateTime<Utc>>,
    ) -> Option<ComplianceSnapshot>;
}

/// A polled change detector for one local source.
pub trait ChangeWatcher {
    /// Returns true if the source changed since the previous poll.
    fn poll(&mut self) -> bool;
}

/// Uncached [`StatusSource`] that queries the connection directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectStatusSource;

impl StatusSource for DirectStatusSource {
    fn fetch(
        &mut self,
        connection: &dyn ServerConnection,
        consumer: ConsumerId,
        on_date: Option<DateTime<Utc>>,
    ) -> Option<ComplianceSnapshot> {
        match connection.compliance_status(consumer, on_date) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(consumer = %consumer, error = %e, "Unable to fetch compliance status");
                None
            }
        }
    }
}

/// Everything the compliance core depends on, injected at construction.
pub struct ComplianceContext {
    pub products: Box<dyn ProductInventory>,
    pub entitlements: Box<dyn EntitlementSource>,
    pub identity: Box<dyn IdentitySource>,
    pub connections: Box<dyn ConnectionProvider>,
    pub status_source: Box<dyn StatusSource>,
}

impl ComplianceContext {
    /// Bundles the collaborators, using [`DirectStatusSource`] for verdicts.
    pub fn new(
        products: Box<dyn ProductInventory>,
        entitlements: Box<dyn EntitlementSource>,
        identity: Box<dyn IdentitySource>,
        connections: Box<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            products,
            entitlements,
            identity,
            connections,
            status_source: Box::new(DirectStatusSource),
        }
    }

    /// Replaces the verdict source.
    #[must_use]
    pub fn with_status_source(mut self, source: Box<dyn StatusSource>) -> Self {
        self.status_source = source;
        self
    }
}
