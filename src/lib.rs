//! Floodwall - storage-backed request rate limiting
//!
//! This crate decides, per inbound request, whether to allow or block it,
//! based on a sliding-window count of prior requests matching a composite
//! tracking key (resource fields and/or user identity, falling back to the
//! client IP), with blacklist/whitelist overrides and a persistent audit
//! log. Persistence is abstracted behind the [`limit::LogStore`] trait; the
//! host integration supplies the HTTP surface and the scheduler that drives
//! the archiver.

pub mod config;
pub mod error;
pub mod identity;
pub mod limit;
pub mod response;

pub use config::{LimiterConfig, Overrides, ResponseType};
pub use error::{FloodwallError, Result};
pub use limit::{Archiver, Decision, LogStore, MemoryStore, Method, PolicyEvaluator, RequestContext};
