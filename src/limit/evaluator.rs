//! Core decision engine.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

use super::entry::{Decision, RequestLogEntry};
use super::predicate::TrackingKeyBuilder;
use super::store::LogStore;
use crate::config::{EffectiveLimits, LimiterConfig, Overrides};
use crate::error::{FloodwallError, Result};
use crate::identity;

/// HTTP verb of the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Only state-changing verbs are rate limited; read-only requests
    /// bypass the evaluator entirely.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }
}

/// Everything the evaluator needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub remote_addr: Option<String>,
    /// Tracked resource and user-identity values supplied by the host
    /// integration.
    pub data: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            remote_addr: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }
}

/// The decision engine: blacklist/whitelist short-circuiting, composite key
/// composition, the already-blocked check, the threshold check, and the
/// audit log write.
///
/// Stateless between calls except through the shared store. The
/// already-blocked check, the threshold count, and the log write are three
/// separate store round-trips with no lock held across them, so two
/// concurrent requests on the same key can both pass the threshold check
/// before either write lands. Adapters that need strict enforcement must
/// serialize these steps per tracking key.
pub struct PolicyEvaluator {
    config: LimiterConfig,
    store: Arc<dyn LogStore>,
}

impl PolicyEvaluator {
    /// Create an evaluator over a validated configuration.
    pub fn new(config: LimiterConfig, store: Arc<dyn LogStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decide whether one request is allowed, using the current wall clock.
    pub async fn evaluate(
        &self,
        request: &RequestContext,
        overrides: Option<&Overrides>,
    ) -> Result<Decision> {
        self.evaluate_at(request, overrides, Utc::now()).await
    }

    /// Decide whether one request is allowed, as of `now`.
    ///
    /// The pipeline short-circuits in order: blacklist, verb and whitelist
    /// bypass, already-blocked, threshold. Exactly one log entry is written
    /// per evaluated request, and none for bypassed or already-blocked ones.
    pub async fn evaluate_at(
        &self,
        request: &RequestContext,
        overrides: Option<&Overrides>,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let client_ip = identity::resolve(&request.headers, request.remote_addr.as_deref());

        // Blacklist wins over everything, including the verb bypass.
        if self.config.blacklist_ips.contains(&client_ip) {
            debug!(ip = %client_ip, "Blacklisted IP refused");
            return Ok(Decision::blacklisted());
        }

        if !request.method.is_rate_limited() || self.config.whitelist_ips.contains(&client_ip) {
            trace!(ip = %client_ip, method = ?request.method, "Request bypasses rate limiting");
            return Ok(Decision::allowed());
        }

        self.require_tracked_resources(&request.data)?;

        let limits = EffectiveLimits::new(&self.config, overrides);
        let predicate = TrackingKeyBuilder::build(
            &self.config.resource_fields,
            &self.config.user_data_fields,
            &request.data,
            &client_ip,
        )?;

        trace!(key = %predicate, requests = limits.requests, "Checking rate limit");

        // An unexpired block on this key refuses the request without
        // writing a new entry.
        let block_check = predicate.clone().blocked_till_after(now);
        if let Some(blocked_till) = self.store.latest_blocked_till(&block_check).await? {
            debug!(key = %predicate, blocked_till = %blocked_till, "Caller already blocked");
            return Ok(Decision::already_blocked(blocked_till));
        }

        let triggered = if limits.requests == 0 {
            false
        } else {
            let window_start = now - Duration::minutes(limits.duration);
            let count = self
                .store
                .count(&predicate.clone().created_after(window_start))
                .await?;
            trace!(key = %predicate, count = count, "Window count");
            count >= limits.requests
        };

        let blocked_till = if triggered {
            let till = now + Duration::minutes(limits.block_duration);
            debug!(key = %predicate, blocked_till = %till, "Rate limit exceeded, blocking");
            Some(till)
        } else {
            None
        };

        self.store
            .insert(self.build_entry(request, &client_ip, blocked_till, now))
            .await?;

        match blocked_till {
            Some(till) => Ok(Decision::blocked(till)),
            None => Ok(Decision::allowed()),
        }
    }

    /// Every resource field marked tracked must be present in the call data.
    fn require_tracked_resources(&self, data: &BTreeMap<String, String>) -> Result<()> {
        for (field, tracked) in &self.config.resource_fields {
            if *tracked && !data.contains_key(field) {
                return Err(FloodwallError::Usage(format!(
                    "tracked resource field '{}' not set",
                    field
                )));
            }
        }
        Ok(())
    }

    fn build_entry(
        &self,
        request: &RequestContext,
        client_ip: &str,
        blocked_till: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RequestLogEntry {
        let resource_values: BTreeMap<String, String> = self
            .config
            .resource_fields
            .iter()
            .filter(|(_, tracked)| **tracked)
            .filter_map(|(field, _)| {
                request
                    .data
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();

        let user_data_values: BTreeMap<String, String> = self
            .config
            .user_data_fields
            .iter()
            .filter(|(_, tracked)| **tracked)
            .filter_map(|(field, _)| {
                request
                    .data
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();

        RequestLogEntry::new(
            now,
            request.url.clone(),
            client_ip.to_string(),
            blocked_till,
            resource_values,
            user_data_values,
        )
    }
}
