//! Change-aware compliance status with observer fan-out.
//!
//! No timer lives here: callers poll [`ChangeAwareSorter::force_check`]
//! from their own event loop.

use crate::aggregator::StatusAggregator;
use crate::config::ComplianceConfig;
use crate::error::{ComplianceError, ComplianceResult};
use crate::observers::{Callback, Observers};
use crate::sources::{ChangeWatcher, ComplianceContext};
use crate::watch::WatchKind;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Outcome of pushing the installed product list to the authority.
#[derive(Debug)]
pub enum InventorySync {
    /// The authority accepted the list.
    Updated,
    /// Nothing was sent (unregistered, or syncing is disabled).
    Skipped,
    /// The consumer identity was rejected; nothing was sent.
    AuthFailed(ComplianceError),
}

impl InventorySync {
    /// Returns true if the authority received the list.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// Pushes the installed product list for the registered consumer.
///
/// Identity failures are reported as [`InventorySync::AuthFailed`]; any
/// other failure is an error.
pub fn sync_installed_products(context: &mut ComplianceContext) -> ComplianceResult<InventorySync> {
    if !context.identity.is_registered() {
        return Ok(InventorySync::Skipped);
    }
    let Some(consumer) = context.identity.consumer_id() else {
        return Ok(InventorySync::Skipped);
    };

    let products: Vec<_> = context.products.list_installed().into_values().collect();
    let result = context
        .connections
        .connection()
        .and_then(|connection| connection.update_installed_products(consumer, &products));

    match result {
        Ok(()) => {
            debug!(consumer = %consumer, count = products.len(), "Installed products synced");
            Ok(InventorySync::Updated)
        }
        Err(e) if e.is_auth_failure() => {
            warn!(consumer = %consumer, error = %e, "Invalid consumer certificate, installed products not synced");
            Ok(InventorySync::AuthFailed(e))
        }
        Err(e) => Err(e),
    }
}

/// A [`StatusAggregator`] that follows local changes and notifies observers.
pub struct ChangeAwareSorter {
    aggregator: StatusAggregator,
    watchers: BTreeMap<WatchKind, Box<dyn ChangeWatcher>>,
    observers: Rc<Observers>,
    last_sync: InventorySync,
}

impl ChangeAwareSorter {
    /// Syncs the installed product list, then performs the first load.
    ///
    /// The sync has to happen first: the authority's verdict is only
    /// accurate once it knows what is installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial sync fails for a reason other than
    /// a rejected identity.
    pub fn new(
        mut context: ComplianceContext,
        config: ComplianceConfig,
        watchers: impl IntoIterator<Item = (WatchKind, Box<dyn ChangeWatcher>)>,
    ) -> ComplianceResult<Self> {
        let last_sync = if config.sync_installed_products {
            sync_installed_products(&mut context)?
        } else {
            InventorySync::Skipped
        };

        Ok(Self {
            aggregator: StatusAggregator::new(context, config),
            watchers: watchers.into_iter().collect(),
            observers: Rc::new(Observers::new()),
            last_sync,
        })
    }

    /// Outcome of the most recent installed product sync.
    #[must_use]
    pub fn last_sync(&self) -> &InventorySync {
        &self.last_sync
    }

    /// The wrapped aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &StatusAggregator {
        &self.aggregator
    }

    /// Recomputes the view without notifying observers.
    pub fn load(&mut self) {
        self.aggregator.load();
    }

    /// Pushes the installed product list again.
    pub fn sync_installed_products(&mut self) -> ComplianceResult<&InventorySync> {
        self.last_sync = if self.aggregator.config().sync_installed_products {
            sync_installed_products(self.aggregator.context_mut())?
        } else {
            InventorySync::Skipped
        };
        Ok(&self.last_sync)
    }

    /// Polls every watcher once. Each changed source is refreshed and the
    /// view reloaded; observers are notified once if anything changed.
    pub fn force_check(&mut self) {
        let changed: Vec<WatchKind> = self
            .watchers
            .iter_mut()
            .filter_map(|(kind, watcher)| watcher.poll().then_some(*kind))
            .collect();

        for kind in &changed {
            self.handle_change(*kind);
        }
        if !changed.is_empty() {
            self.notify();
        }
    }

    /// Refreshes the local state behind `kind`, then reloads.
    pub fn handle_change(&mut self, kind: WatchKind) {
        debug!(source = %kind, "Local source changed");
        match kind {
            WatchKind::Product => {
                self.aggregator.context_mut().products.refresh();
                if let Err(e) = self.sync_installed_products() {
                    warn!(error = %e, "Unable to sync installed products");
                }
            }
            WatchKind::Entitlement => {
                self.aggregator.context_mut().entitlements.refresh();
            }
            WatchKind::Consumer => {
                let context = self.aggregator.context_mut();
                context.identity.reload();
                context.connections.reset();
            }
        }
        self.aggregator.load();
    }

    /// Reloads and notifies observers.
    pub fn on_change(&mut self) {
        self.aggregator.load();
        self.notify();
    }

    /// Invokes every registered observer.
    pub fn notify(&self) {
        info!(
            observers = self.observers.len(),
            status = %self.aggregator.system_status_id(),
            "Compliance status recomputed"
        );
        self.observers.notify();
    }

    /// Registers an observer. Returns false if it was already registered.
    pub fn add_callback(&self, callback: Callback) -> bool {
        self.observers.add(callback)
    }

    /// Unregisters an observer. Returns false if it was not registered.
    pub fn remove_callback(&self, callback: &Callback) -> bool {
        self.observers.remove(callback)
    }

    /// Shared handle to the observer set, for callbacks that manage
    /// registrations themselves.
    #[must_use]
    pub fn observers(&self) -> Rc<Observers> {
        Rc::clone(&self.observers)
    }

    /// Returns true if any entitlement certificate is present locally.
    #[must_use]
    pub fn has_entitlements(&self) -> bool {
        !self.aggregator.context().entitlements.list().is_empty()
    }
}

impl Deref for ChangeAwareSorter {
    type Target = StatusAggregator;

    fn deref(&self) -> &Self::Target {
        &self.aggregator
    }
}
