//! Domain model types for gogcli.
//!
//! This module defines:
//! - [`Service`] - The Google services the CLI talks to
//! - [`TokenSourceKind`] - Which credential backend produced a token source

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.settings.basic",
];
const DRIVE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive"];
const CALENDAR_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

/// A Google service the CLI can call.
///
/// # Examples
///
/// ```
/// use gogcli_core::Service;
///
/// let drive: Service = "drive".parse().unwrap();
/// assert_eq!(drive.external_section(), "gdrive");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Gmail,
    Drive,
    Calendar,
}

impl Service {
    /// All known services.
    pub const ALL: [Service; 3] = [Service::Gmail, Service::Drive, Service::Calendar];

    /// The label used in logs, errors, and service-label based resolution.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Drive => "drive",
            Self::Calendar => "calendar",
        }
    }

    /// Section name in the external token config file.
    pub fn external_section(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Drive => "gdrive",
            Self::Calendar => "calendar",
        }
    }

    /// OAuth scopes required to call this service.
    pub fn scopes(&self) -> Vec<String> {
        let scopes = match self {
            Self::Gmail => GMAIL_SCOPES,
            Self::Drive => DRIVE_SCOPES,
            Self::Calendar => CALENDAR_SCOPES,
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }

    /// Map a free-form service label onto a known service.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "gmail" => Some(Self::Gmail),
            "drive" | "gdrive" => Some(Self::Drive),
            "calendar" => Some(Self::Calendar),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownService(s.to_string()))
    }
}

/// Returned when parsing a service label that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0} (expected gmail, drive or calendar)")]
pub struct UnknownService(pub String);

/// The credential backend a token source was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSourceKind {
    /// Pre-issued token from the external token config file.
    External,
    /// Service-account key.
    ServiceAccount,
    /// Access token read from the secrets store, used as-is.
    StoredAccess,
    /// Refresh token read from the secrets store, exchanged lazily.
    StoredRefresh,
}

impl TokenSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::ServiceAccount => "service_account",
            Self::StoredAccess => "stored_access",
            Self::StoredRefresh => "stored_refresh",
        }
    }
}

impl fmt::Display for TokenSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
