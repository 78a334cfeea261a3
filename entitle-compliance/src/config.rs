//! Configuration for the compliance core.

use crate::error::ComplianceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for [`StatusAggregator`](crate::StatusAggregator) and
/// [`ChangeAwareSorter`](crate::ChangeAwareSorter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Instant the authority is asked about; `None` means now.
    ///
    /// Local future/expired classification always uses the real clock.
    #[serde(default)]
    pub on_date: Option<DateTime<Utc>>,
    /// Push the installed product list to the authority before loading and
    /// after product changes.
    #[serde(default = "default_sync_installed_products")]
    pub sync_installed_products: bool,
}

fn default_sync_installed_products() -> bool {
    true
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            on_date: None,
            sync_installed_products: default_sync_installed_products(),
        }
    }
}

impl ComplianceConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> ComplianceResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the evaluation instant.
    #[must_use]
    pub fn with_on_date(mut self, on_date: DateTime<Utc>) -> Self {
        self.on_date = Some(on_date);
        self
    }
}
