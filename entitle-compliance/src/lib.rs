//! Compliance status for installed products.
//!
//! This crate reconciles the entitlement authority's compliance verdict with
//! the certificates found on the machine and exposes one system status plus
//! one status per installed product.
//!
//! # Components
//!
//! - **StatusAggregator**: merges the verdict with local certificates into a
//!   [`ComplianceView`] and answers status queries
//! - **ChangeAwareSorter**: reloads when local sources change and notifies
//!   registered observers
//! - **Stacking groups**: groups entitlements by stacking key for display
//!
//! # Flow
//!
//! 1. A watcher reports a change (or the caller asks for a reload)
//! 2. The matching local source is refreshed
//! 3. The verdict is fetched and reconciled with local certificates
//! 4. Every observer is notified
//!
//! Everything runs on the caller's thread. Collaborators are injected
//! through [`ComplianceContext`]; nothing is looked up globally.

mod aggregator;
mod certificate;
mod config;
mod error;
mod observers;
mod snapshot;
mod sorter;
pub mod sources;
pub mod stacking;
mod status;
mod watch;

pub use aggregator::{valid_until, ComplianceView, StatusAggregator};
pub use certificate::{EntitlementCertificate, InstalledProduct, Order};
pub use config::ComplianceConfig;
pub use error::{ComplianceError, ComplianceResult};
pub use observers::{Callback, Observers};
pub use snapshot::{ComplianceSnapshot, EntitlementPayloads, Reason};
pub use sorter::{sync_installed_products, ChangeAwareSorter, InventorySync};
pub use sources::{
    ChangeWatcher, ComplianceContext, ConnectionProvider, DirectStatusSource, EntitlementSource,
    IdentitySource, ProductInventory, ServerConnection, StatusSource,
};
pub use stacking::{
    assemble_groups, EntitlementCertScheme, FnScheme, PoolJsonScheme, StackGroup, StackingScheme,
};
pub use status::{IconStatus, ProductStatus, SystemStatus};
pub use watch::{DirectoryWatch, WatchKind};
