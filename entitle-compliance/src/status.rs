//! The stable status vocabulary.
//!
//! These strings and codes are consumed by desktop shells, provisioning
//! tools and command line front ends. They must never be renamed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// System-wide compliance status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SystemStatus {
    /// Every installed product is covered.
    Valid,
    /// At least one installed product is not covered.
    Invalid,
    /// Coverage exists but is insufficient.
    Partial,
    /// Compliance is not enforced for this consumer.
    Disabled,
    /// No verdict is available.
    #[default]
    Unknown,
    /// A status string the authority introduced after this vocabulary.
    Other(String),
}

impl SystemStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Partial => "partial",
            Self::Disabled => "disabled",
            Self::Unknown => "unknown",
            Self::Other(other) => other,
        }
    }

    /// Returns the display label for this status.
    ///
    /// Statuses outside the vocabulary are shown as unknown.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid => "Current",
            Self::Partial => "Insufficient",
            Self::Invalid => "Invalid",
            Self::Disabled => "Disabled",
            Self::Unknown | Self::Other(_) => "Unknown",
        }
    }

    /// Maps every known status string to its display label.
    #[must_use]
    pub fn status_map() -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("valid", Self::Valid.label()),
            ("partial", Self::Partial.label()),
            ("invalid", Self::Invalid.label()),
            ("disabled", Self::Disabled.label()),
            ("unknown", Self::Unknown.label()),
        ])
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "valid" => Self::Valid,
            "invalid" => Self::Invalid,
            "partial" => Self::Partial,
            "disabled" => Self::Disabled,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        })
    }
}

impl Serialize for SystemStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SystemStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Per-product compliance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Only entitlements starting later exist.
    FutureSubscribed,
    /// Fully covered.
    Subscribed,
    /// Installed without coverage.
    NotSubscribed,
    /// Only expired entitlements exist.
    Expired,
    /// Covered by an incomplete stack.
    PartiallySubscribed,
    /// Not classified (unregistered, or an unexpected server response).
    Unknown,
}

impl ProductStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FutureSubscribed => "future_subscribed",
            Self::Subscribed => "subscribed",
            Self::NotSubscribed => "not_subscribed",
            Self::Expired => "expired",
            Self::PartiallySubscribed => "partially_subscribed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes for tray icons and similar compact indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IconStatus {
    Valid = 0,
    Expired = 1,
    Warning = 2,
    LegacyMode = 3,
    PartiallyValid = 4,
    RegistrationRequired = 5,
}

impl IconStatus {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}
