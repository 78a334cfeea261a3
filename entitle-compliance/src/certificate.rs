//! Local inventory and certificate models.
//!
//! Certificates are parsed and verified elsewhere; the compliance core only
//! reads the fields below.

use chrono::{DateTime, Duration, Utc};
use entitle_types::{ProductId, StackId, ValidityRange};
use serde::{Deserialize, Serialize};

/// A product installed on this machine, as described by its product certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledProduct {
    /// Product identifier.
    pub id: ProductId,
    /// Human readable product name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Comma separated architectures the product was built for.
    pub arch: String,
}

impl InstalledProduct {
    /// Creates an installed product with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<ProductId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            version: String::new(),
            arch: String::new(),
        }
    }

    /// Sets the product name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the version and architecture.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>, arch: impl Into<String>) -> Self {
        self.version = version.into();
        self.arch = arch.into();
        self
    }
}

/// Subscription order details embedded in an entitlement certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    /// Subscription name.
    pub name: Option<String>,
    /// Stacking key shared by entitlements that combine.
    pub stacking_id: Option<StackId>,
    /// Days before the end of validity during which the entitlement is "expiring".
    #[serde(default)]
    pub warning_period_days: u32,
}

/// A local entitlement certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCertificate {
    /// Certificate serial number.
    pub serial: u64,
    /// Validity window.
    pub validity: ValidityRange,
    /// Products this certificate covers, in certificate order.
    pub products: Vec<ProductId>,
    /// Order details, absent on very old certificates.
    pub order: Option<Order>,
}

impl EntitlementCertificate {
    /// Creates a certificate without order details.
    #[must_use]
    pub fn new(serial: u64, validity: ValidityRange, products: Vec<ProductId>) -> Self {
        Self {
            serial,
            validity,
            products,
            order: None,
        }
    }

    /// Attaches order details.
    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Returns true if the certificate covers `product_id`.
    #[must_use]
    pub fn covers(&self, product_id: &ProductId) -> bool {
        self.products.contains(product_id)
    }

    /// Returns true if the certificate is valid right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.has_now()
    }

    /// Returns true if the certificate is valid right now but within its
    /// warning period.
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        self.is_expiring_at(Utc::now())
    }

    /// Returns true if the certificate is valid at `at` but within its
    /// warning period. The period opens strictly after `end - warning`.
    #[must_use]
    pub fn is_expiring_at(&self, at: DateTime<Utc>) -> bool {
        let warning_days = match &self.order {
            Some(order) if order.warning_period_days > 0 => order.warning_period_days,
            _ => return false,
        };
        self.validity.contains(at)
            && self.validity.remaining(at) < Duration::days(i64::from(warning_days))
    }

    /// Returns the stacking key, if any.
    #[must_use]
    pub fn stacking_id(&self) -> Option<&StackId> {
        self.order.as_ref().and_then(|o| o.stacking_id.as_ref())
    }

    /// Returns the subscription name, if any.
    #[must_use]
    pub fn order_name(&self) -> Option<&str> {
        self.order.as_ref().and_then(|o| o.name.as_deref())
    }
}
