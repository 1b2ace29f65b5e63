//! Rate limiting logic and log storage.

mod archiver;
mod entry;
mod evaluator;
mod memory;
mod predicate;
mod store;

pub use archiver::{Archiver, SweepReport};
pub use entry::{Decision, RequestLogEntry};
pub use evaluator::{Method, PolicyEvaluator, RequestContext};
pub use memory::MemoryStore;
pub use predicate::{Predicate, Term, TrackingKeyBuilder};
pub use store::LogStore;
