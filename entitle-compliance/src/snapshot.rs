//! The authority's compliance verdict, as received on the wire.

use crate::error::ComplianceResult;
use chrono::{DateTime, Utc};
use entitle_types::{parse_server_date, ProductId, StackId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Entitlement payloads attached to a product or stack, kept as raw JSON.
pub type EntitlementPayloads = Vec<Value>;

/// A structured explanation of why something is not fully compliant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reason {
    /// Machine readable reason key (e.g. `NOTCOVERED`).
    #[serde(default)]
    pub key: String,
    /// Message for display.
    #[serde(default)]
    pub message: String,
    /// Reason-specific attributes such as `product_id` or `stack_id`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// One compliance verdict for one evaluation instant.
///
/// Fields the authority omitted deserialize as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSnapshot {
    /// Fully covered products.
    #[serde(default)]
    pub compliant_products: BTreeMap<ProductId, EntitlementPayloads>,
    /// Products covered by an incomplete stack.
    #[serde(default)]
    pub partially_compliant_products: BTreeMap<ProductId, EntitlementPayloads>,
    /// Incomplete stacks and the entitlements composing them.
    #[serde(default)]
    pub partial_stacks: BTreeMap<StackId, EntitlementPayloads>,
    /// Products without coverage.
    #[serde(default)]
    pub non_compliant_products: Vec<ProductId>,
    /// Overall status label; older authorities do not send one.
    #[serde(default)]
    pub status: Option<String>,
    /// First instant at which the consumer is no longer compliant.
    #[serde(default)]
    pub compliant_until: Option<String>,
    /// Structured reasons; absent on authorities that do not support them.
    #[serde(default)]
    pub reasons: Option<Vec<Reason>>,
}

impl ComplianceSnapshot {
    /// Parses a snapshot from the authority's JSON response.
    pub fn from_json(json: &str) -> ComplianceResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the explicit status label, if present and non-empty.
    #[must_use]
    pub fn explicit_status(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| !s.is_empty())
    }

    /// Parses `compliant_until`.
    ///
    /// # Errors
    ///
    /// Returns an error if the authority sent something that is not a timestamp.
    pub fn compliant_until(&self) -> ComplianceResult<Option<DateTime<Utc>>> {
        match &self.compliant_until {
            Some(raw) => Ok(Some(parse_server_date(raw)?)),
            None => Ok(None),
        }
    }
}
