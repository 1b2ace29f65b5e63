//! Request log entries and evaluation decisions.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single audit log record, written once per evaluated request and never
/// updated. `blocked_till` is set only on the request that triggered a new
/// block.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLogEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub request_url: String,
    pub ip_address: String,
    pub blocked_till: Option<DateTime<Utc>>,
    /// Values for the tracked resource fields, exactly as configured at
    /// write time.
    pub resource_values: BTreeMap<String, String>,
    /// Values for the tracked user-data fields that were present on the
    /// request. Absent fields are simply not recorded.
    pub user_data_values: BTreeMap<String, String>,
}

impl RequestLogEntry {
    pub fn new(
        created_at: DateTime<Utc>,
        request_url: String,
        ip_address: String,
        blocked_till: Option<DateTime<Utc>>,
        resource_values: BTreeMap<String, String>,
        user_data_values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            request_url,
            ip_address,
            blocked_till,
            resource_values,
            user_data_values,
        }
    }

    /// Look up a named field for predicate matching.
    ///
    /// The fixed columns resolve by their well-known names; anything else is
    /// looked up in the resource values first, then the user-data values.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "ip_address" => Some(self.ip_address.as_str()),
            "request_url" => Some(self.request_url.as_str()),
            _ => self
                .resource_values
                .get(name)
                .or_else(|| self.user_data_values.get(name))
                .map(String::as_str),
        }
    }
}

/// The evaluator's verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The client IP is on the blacklist.
    pub blacklisted: bool,
    /// An unexpired block from an earlier request matched this key.
    pub already_blocked: bool,
    /// When the block expires, for either block outcome.
    pub blocked_till: Option<DateTime<Utc>>,
    /// This request is the one that crossed the threshold.
    pub blocked_on_this_request: bool,
}

impl Decision {
    /// The request proceeds.
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    /// Refused because the client IP is blacklisted.
    pub fn blacklisted() -> Self {
        Self {
            blacklisted: true,
            ..Default::default()
        }
    }

    /// Refused because an unexpired block already covers this key.
    pub fn already_blocked(blocked_till: DateTime<Utc>) -> Self {
        Self {
            already_blocked: true,
            blocked_till: Some(blocked_till),
            ..Default::default()
        }
    }

    /// Refused because this request crossed the threshold.
    pub fn blocked(blocked_till: DateTime<Utc>) -> Self {
        Self {
            blocked_on_this_request: true,
            blocked_till: Some(blocked_till),
            ..Default::default()
        }
    }
}
