//! Reconciliation of the authority's verdict with local certificates.
//!
//! The authority is the source of truth for what is valid or partially
//! valid. Local certificates fill the gaps it leaves: products whose only
//! entitlements have expired or have not started yet. Local inventory wins
//! over the authority when they disagree about what is installed.

use crate::certificate::{EntitlementCertificate, InstalledProduct};
use crate::config::ComplianceConfig;
use crate::snapshot::{ComplianceSnapshot, EntitlementPayloads, Reason};
use crate::sources::{ComplianceContext, ProductInventory};
use crate::status::{IconStatus, ProductStatus, SystemStatus};
use chrono::{DateTime, Duration, Utc};
use entitle_types::{ProductId, StackId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Converts the authority's "first invalid second" into the first full day
/// of non-compliance.
#[must_use]
pub fn valid_until(compliant_until: DateTime<Utc>) -> DateTime<Utc> {
    compliant_until - Duration::seconds(1) + Duration::hours(24)
}

/// The derived compliance state. Replaced wholesale on every load.
///
/// After reconciliation every product appears in at most one of the five
/// product buckets.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComplianceView {
    /// Fully covered products, as reported by the authority.
    pub valid_products: BTreeMap<ProductId, EntitlementPayloads>,
    /// Products covered by an incomplete stack, as reported by the authority.
    pub partially_valid_products: BTreeMap<ProductId, EntitlementPayloads>,
    /// Incomplete stacks, as reported by the authority.
    pub partial_stacks: BTreeMap<StackId, EntitlementPayloads>,
    /// Products whose only local entitlements have ended.
    pub expired_products: BTreeMap<ProductId, Vec<EntitlementCertificate>>,
    /// Products whose only local entitlements start later.
    pub future_products: BTreeMap<ProductId, Vec<EntitlementCertificate>>,
    /// Installed products without coverage.
    pub unentitled_products: BTreeMap<ProductId, InstalledProduct>,
    pub system_status: SystemStatus,
    /// Start of the first full day without compliance.
    pub valid_until: Option<DateTime<Utc>>,
    /// Local certificates inside their validity window.
    pub valid_entitlement_certs: Vec<EntitlementCertificate>,
    pub reasons: Vec<Reason>,
    /// Whether the authority sent reasons at all.
    pub supports_reasons: bool,
}

impl ComplianceView {
    /// Merges a verdict with local state.
    ///
    /// `now` drives local future/expired classification and is independent
    /// of the instant the verdict was computed for.
    #[must_use]
    pub fn reconcile(
        snapshot: ComplianceSnapshot,
        simple_content_access: bool,
        installed: &BTreeMap<ProductId, InstalledProduct>,
        inventory: &dyn ProductInventory,
        certs: &[EntitlementCertificate],
        now: DateTime<Utc>,
    ) -> Self {
        let system_status = derive_system_status(&snapshot);
        let valid_until = match snapshot.compliant_until() {
            Ok(until) => until.map(valid_until),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable compliantUntil");
                None
            }
        };

        let ComplianceSnapshot {
            compliant_products: mut valid_products,
            partially_compliant_products: partially_valid_products,
            partial_stacks,
            non_compliant_products,
            reasons,
            ..
        } = snapshot;

        valid_products.retain(|pid, _| {
            let partial = partially_valid_products.contains_key(pid);
            if partial {
                debug!(product_id = %pid, "Product reported both valid and partially valid");
            }
            !partial
        });

        let covered =
            |pid: &ProductId| valid_products.contains_key(pid) || partially_valid_products.contains_key(pid);

        let mut unentitled_pids: Vec<ProductId> = non_compliant_products
            .into_iter()
            .filter(|pid| !covered(pid))
            .collect();

        // SCA verdicts carry no installed product context.
        if !simple_content_access {
            for pid in installed.keys() {
                if !covered(pid) && !unentitled_pids.contains(pid) {
                    warn!(product_id = %pid, "Installed product not present in response from server");
                    unentitled_pids.push(pid.clone());
                }
            }
        }

        let mut unentitled_products = BTreeMap::new();
        for pid in unentitled_pids {
            match inventory.find_by_product(&pid) {
                Some(product) => {
                    unentitled_products.insert(pid, product);
                }
                None => {
                    warn!(product_id = %pid, "Server reported installed product not on system");
                }
            }
        }

        let unclassified: BTreeSet<&ProductId> =
            installed.keys().filter(|pid| !covered(*pid)).collect();
        let scan = scan_entitlement_certs(certs, &unclassified, now);

        for pid in scan.future_products.keys() {
            unentitled_products.remove(pid);
        }
        let mut expired_products = scan.expired_products;
        expired_products.retain(|pid, _| !scan.future_products.contains_key(pid));
        for pid in expired_products.keys() {
            unentitled_products.remove(pid);
        }

        Self {
            valid_products,
            partially_valid_products,
            partial_stacks,
            expired_products,
            future_products: scan.future_products,
            unentitled_products,
            system_status,
            valid_until,
            valid_entitlement_certs: scan.valid_certs,
            supports_reasons: reasons.is_some(),
            reasons: reasons.unwrap_or_default(),
        }
    }

    /// Returns the bucket `product_id` falls in.
    ///
    /// Buckets are checked partially valid, valid, future, expired,
    /// unentitled; a product in none of them is unknown.
    #[must_use]
    pub fn product_status(&self, product_id: &ProductId) -> ProductStatus {
        if self.partially_valid_products.contains_key(product_id) {
            ProductStatus::PartiallySubscribed
        } else if self.valid_products.contains_key(product_id) {
            ProductStatus::Subscribed
        } else if self.future_products.contains_key(product_id) {
            ProductStatus::FutureSubscribed
        } else if self.expired_products.contains_key(product_id) {
            ProductStatus::Expired
        } else if self.unentitled_products.contains_key(product_id) {
            ProductStatus::NotSubscribed
        } else {
            // Only when the authority does not support the compliance call.
            ProductStatus::Unknown
        }
    }

    /// Number of product buckets containing `product_id`.
    #[must_use]
    pub fn bucket_count(&self, product_id: &ProductId) -> usize {
        [
            self.valid_products.contains_key(product_id),
            self.partially_valid_products.contains_key(product_id),
            self.expired_products.contains_key(product_id),
            self.future_products.contains_key(product_id),
            self.unentitled_products.contains_key(product_id),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

fn derive_system_status(snapshot: &ComplianceSnapshot) -> SystemStatus {
    if let Some(status) = snapshot.explicit_status() {
        return status.parse().unwrap_or_default();
    }
    // Older authorities send no status label.
    let has_reasons = snapshot.reasons.as_ref().is_some_and(|r| !r.is_empty());
    if !snapshot.non_compliant_products.is_empty() {
        SystemStatus::Invalid
    } else if !snapshot.partially_compliant_products.is_empty()
        || !snapshot.partial_stacks.is_empty()
        || has_reasons
    {
        SystemStatus::Partial
    } else {
        SystemStatus::Unknown
    }
}

#[derive(Default)]
struct CertScan {
    future_products: BTreeMap<ProductId, Vec<EntitlementCertificate>>,
    expired_products: BTreeMap<ProductId, Vec<EntitlementCertificate>>,
    valid_certs: Vec<EntitlementCertificate>,
}

fn scan_entitlement_certs(
    certs: &[EntitlementCertificate],
    unclassified: &BTreeSet<&ProductId>,
    now: DateTime<Utc>,
) -> CertScan {
    let mut scan = CertScan::default();

    for cert in certs {
        if cert.validity.contains(now) {
            scan.valid_certs.push(cert.clone());
        }

        for pid in &cert.products {
            if !unclassified.contains(pid) {
                continue;
            }
            // A future entitlement might stack partially once it starts;
            // that cannot be known without evaluating that date.
            let bucket = if cert.validity.starts_after(now) {
                &mut scan.future_products
            } else if cert.validity.ended_before(now) {
                &mut scan.expired_products
            } else {
                continue;
            };
            bucket.entry(pid.clone()).or_default().push(cert.clone());
        }
    }

    scan
}

/// Queries the authority and merges its verdict with local certificates.
///
/// Unregistered systems report [`SystemStatus::Unknown`] without contacting
/// the authority.
pub struct StatusAggregator {
    context: ComplianceContext,
    config: ComplianceConfig,
    installed_products: BTreeMap<ProductId, InstalledProduct>,
    view: ComplianceView,
}

impl StatusAggregator {
    /// Creates an aggregator and performs the first load.
    pub fn new(context: ComplianceContext, config: ComplianceConfig) -> Self {
        let mut aggregator = Self {
            context,
            config,
            installed_products: BTreeMap::new(),
            view: ComplianceView::default(),
        };
        aggregator.load();
        aggregator
    }

    /// Recomputes the view.
    ///
    /// Never fails: when the authority cannot be reached or has no verdict
    /// the previous view is kept.
    pub fn load(&mut self) {
        self.installed_products = self.context.products.list_installed();

        if !self.is_registered() {
            debug!("Unregistered, skipping server compliance check");
            self.view = ComplianceView::default();
            return;
        }
        let Some(consumer) = self.context.identity.consumer_id() else {
            debug!("Registered identity has no consumer ID, skipping server compliance check");
            self.view = ComplianceView::default();
            return;
        };

        let connection = match self.context.connections.connection() {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "No connection to the entitlement server");
                return;
            }
        };

        let Some(snapshot) = self
            .context
            .status_source
            .fetch(connection, consumer, self.config.on_date)
        else {
            debug!(consumer = %consumer, "No compliance status available, keeping previous view");
            return;
        };

        let simple_content_access = match connection.is_simple_content_access(consumer) {
            Ok(sca) => sca,
            Err(e) => {
                warn!(error = %e, "Unable to determine content access mode, assuming entitlement mode");
                false
            }
        };

        let certs = self.context.entitlements.list();
        self.view = ComplianceView::reconcile(
            snapshot,
            simple_content_access,
            &self.installed_products,
            self.context.products.as_ref(),
            &certs,
            Utc::now(),
        );
        self.log_products();
    }

    fn log_products(&self) {
        let view = &self.view;
        debug!(
            valid_products = ?view.valid_products.keys().collect::<Vec<_>>(),
            partial_products = ?view.partially_valid_products.keys().collect::<Vec<_>>(),
            expired_products = ?view.expired_products.keys().collect::<Vec<_>>(),
            unentitled_products = ?view.unentitled_products.keys().collect::<Vec<_>>(),
            future_products = ?view.future_products.keys().collect::<Vec<_>>(),
            valid_until = ?view.valid_until,
            "Product status"
        );
        debug!(partial_stacks = ?view.partial_stacks.keys().collect::<Vec<_>>(), "Partial stacks");
    }

    /// Returns true if the machine holds a usable consumer identity.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.context.identity.is_registered()
    }

    /// Returns the status of one product.
    #[must_use]
    pub fn product_status(&self, product_id: &ProductId) -> ProductStatus {
        if !self.is_registered() {
            return ProductStatus::Unknown;
        }
        self.view.product_status(product_id)
    }

    /// Returns the system-wide status.
    #[must_use]
    pub fn system_status_id(&self) -> SystemStatus {
        if !self.is_registered() {
            return SystemStatus::Unknown;
        }
        self.view.system_status.clone()
    }

    /// Returns the display label of the system-wide status.
    #[must_use]
    pub fn system_status(&self) -> &'static str {
        self.system_status_id().label()
    }

    /// Returns true if entitlements are completely valid (or not enforced).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(
            self.system_status_id(),
            SystemStatus::Valid | SystemStatus::Disabled
        )
    }

    /// Returns true if any currently valid entitlement is about to expire.
    #[must_use]
    pub fn in_warning_period(&self) -> bool {
        self.view
            .valid_entitlement_certs
            .iter()
            .any(EntitlementCertificate::is_expiring)
    }

    /// Returns the icon code for the current state.
    ///
    /// Assumes registration has already been checked by the caller: an
    /// unknown status shows the valid icon.
    #[must_use]
    pub fn status_for_icon(&self) -> IconStatus {
        match self.system_status_id() {
            SystemStatus::Invalid => IconStatus::Expired,
            SystemStatus::Partial => IconStatus::PartiallyValid,
            _ if self.in_warning_period() => IconStatus::Warning,
            _ => IconStatus::Valid,
        }
    }

    /// Returns true if the authority sends structured reasons.
    #[must_use]
    pub fn are_reasons_supported(&self) -> bool {
        self.view.supports_reasons
    }

    /// Reasons from the last verdict.
    #[must_use]
    pub fn reasons(&self) -> &[Reason] {
        &self.view.reasons
    }

    /// Start of the first full day without compliance, if known.
    #[must_use]
    pub fn compliant_until(&self) -> Option<DateTime<Utc>> {
        self.view.valid_until
    }

    /// Incomplete stacks from the last verdict.
    #[must_use]
    pub fn partial_stacks(&self) -> &BTreeMap<StackId, EntitlementPayloads> {
        &self.view.partial_stacks
    }

    /// Local certificates inside their validity window at the last load.
    #[must_use]
    pub fn valid_entitlement_certs(&self) -> &[EntitlementCertificate] {
        &self.view.valid_entitlement_certs
    }

    /// Installed products as of the last load.
    #[must_use]
    pub fn installed_products(&self) -> &BTreeMap<ProductId, InstalledProduct> {
        &self.installed_products
    }

    /// The full derived view.
    #[must_use]
    pub fn view(&self) -> &ComplianceView {
        &self.view
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub(crate) fn context(&self) -> &ComplianceContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut ComplianceContext {
        &mut self.context
    }
}
