//! Tracking predicates and composite key composition.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::entry::RequestLogEntry;
use crate::error::{FloodwallError, Result};

/// One conjunct of a tracking predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// The named field equals the given value.
    FieldEq(String, String),
    /// `created_at` is strictly after the timestamp.
    CreatedAfter(DateTime<Utc>),
    /// `created_at` is strictly before the timestamp.
    CreatedBefore(DateTime<Utc>),
    /// `blocked_till` is set and strictly after the timestamp.
    BlockedTillAfter(DateTime<Utc>),
}

/// A conjunction of terms matched against log entries.
///
/// This is the contract between the evaluator and any store adapter: an
/// adapter translating the predicate into its own query language must select
/// exactly the entries `matches` accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push(Term::FieldEq(field.into(), value.into()));
        self
    }

    pub fn created_after(mut self, when: DateTime<Utc>) -> Self {
        self.terms.push(Term::CreatedAfter(when));
        self
    }

    pub fn created_before(mut self, when: DateTime<Utc>) -> Self {
        self.terms.push(Term::CreatedBefore(when));
        self
    }

    pub fn blocked_till_after(mut self, when: DateTime<Utc>) -> Self {
        self.terms.push(Term::BlockedTillAfter(when));
        self
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Whether the entry satisfies every term.
    pub fn matches(&self, entry: &RequestLogEntry) -> bool {
        self.terms.iter().all(|term| match term {
            Term::FieldEq(field, value) => entry.field(field) == Some(value.as_str()),
            Term::CreatedAfter(when) => entry.created_at > *when,
            Term::CreatedBefore(when) => entry.created_at < *when,
            Term::BlockedTillAfter(when) => {
                entry.blocked_till.map(|till| till > *when).unwrap_or(false)
            }
        })
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .terms
            .iter()
            .map(|term| match term {
                Term::FieldEq(field, value) => format!("{}={}", field, value),
                Term::CreatedAfter(when) => format!("created_at>{}", when.to_rfc3339()),
                Term::CreatedBefore(when) => format!("created_at<{}", when.to_rfc3339()),
                Term::BlockedTillAfter(when) => format!("blocked_till>{}", when.to_rfc3339()),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Builds the composite match predicate shared by the already-blocked and
/// threshold queries.
pub struct TrackingKeyBuilder;

impl TrackingKeyBuilder {
    /// Compose the tracking predicate for one request.
    ///
    /// Every tracked resource field contributes an equality term and must be
    /// present in `data`. Tracked user-data fields contribute equality terms
    /// only when present; if any was, the client IP stays out of the key.
    /// Only when no tracked user identity is available does the predicate
    /// fall back to the IP. User identity, when supplied, supersedes IP
    /// tracking for that request.
    pub fn build(
        resource_fields: &BTreeMap<String, bool>,
        user_data_fields: &BTreeMap<String, bool>,
        data: &BTreeMap<String, String>,
        client_ip: &str,
    ) -> Result<Predicate> {
        let mut predicate = Predicate::new();

        for (field, tracked) in resource_fields {
            if !tracked {
                continue;
            }
            let value = data.get(field).ok_or_else(|| {
                FloodwallError::Usage(format!("tracked resource field '{}' not set", field))
            })?;
            predicate = predicate.field_eq(field, value);
        }

        let mut tracked_by_user_data = false;
        for (field, tracked) in user_data_fields {
            if !tracked {
                continue;
            }
            if let Some(value) = data.get(field) {
                tracked_by_user_data = true;
                predicate = predicate.field_eq(field, value);
            }
        }

        if !tracked_by_user_data {
            predicate = predicate.field_eq("ip_address", client_ip);
        }

        Ok(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resource_fields_require_values() {
        let resources = fields(&[("class_name", true)]);
        let result = TrackingKeyBuilder::build(
            &resources,
            &BTreeMap::new(),
            &BTreeMap::new(),
            "203.0.113.9",
        );
        assert!(matches!(result, Err(FloodwallError::Usage(_))));
    }

    #[test]
    fn test_untracked_resource_fields_are_skipped() {
        let resources = fields(&[("class_name", false)]);
        let predicate = TrackingKeyBuilder::build(
            &resources,
            &BTreeMap::new(),
            &BTreeMap::new(),
            "203.0.113.9",
        )
        .unwrap();
        // Only the IP fallback term remains.
        assert_eq!(predicate.terms().len(), 1);
    }

    #[test]
    fn test_user_data_supersedes_ip() {
        let user_data = fields(&[("user_id", true)]);
        let d = data(&[("user_id", "u-42")]);
        let predicate =
            TrackingKeyBuilder::build(&BTreeMap::new(), &user_data, &d, "203.0.113.9").unwrap();

        assert!(predicate
            .terms()
            .contains(&Term::FieldEq("user_id".to_string(), "u-42".to_string())));
        assert!(!predicate
            .terms()
            .iter()
            .any(|t| matches!(t, Term::FieldEq(f, _) if f == "ip_address")));
    }

    #[test]
    fn test_ip_fallback_when_user_data_absent() {
        let user_data = fields(&[("user_id", true)]);
        let predicate = TrackingKeyBuilder::build(
            &BTreeMap::new(),
            &user_data,
            &BTreeMap::new(),
            "203.0.113.9",
        )
        .unwrap();

        assert_eq!(
            predicate.terms(),
            &[Term::FieldEq(
                "ip_address".to_string(),
                "203.0.113.9".to_string()
            )]
        );
    }

    #[test]
    fn test_predicate_matches_entry() {
        let entry = RequestLogEntry::new(
            Utc::now(),
            "/orders".to_string(),
            "203.0.113.9".to_string(),
            None,
            data(&[("class_name", "orders")]),
            BTreeMap::new(),
        );

        let hit = Predicate::new()
            .field_eq("class_name", "orders")
            .field_eq("ip_address", "203.0.113.9");
        assert!(hit.matches(&entry));

        let miss = Predicate::new().field_eq("class_name", "payments");
        assert!(!miss.matches(&entry));
    }

    #[test]
    fn test_time_terms() {
        let now = Utc::now();
        let entry = RequestLogEntry::new(
            now,
            "/".to_string(),
            "203.0.113.9".to_string(),
            Some(now + chrono::Duration::minutes(10)),
            BTreeMap::new(),
            BTreeMap::new(),
        );

        assert!(Predicate::new()
            .created_after(now - chrono::Duration::minutes(1))
            .matches(&entry));
        assert!(!Predicate::new().created_before(now).matches(&entry));
        assert!(Predicate::new().blocked_till_after(now).matches(&entry));
        assert!(!Predicate::new()
            .blocked_till_after(now + chrono::Duration::minutes(11))
            .matches(&entry));
    }

    #[test]
    fn test_blocked_till_term_rejects_unblocked_entries() {
        let now = Utc::now();
        let entry = RequestLogEntry::new(
            now,
            "/".to_string(),
            "203.0.113.9".to_string(),
            None,
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(!Predicate::new().blocked_till_after(now).matches(&entry));
    }
}
