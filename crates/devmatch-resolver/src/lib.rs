//! devmatch resolver
//!
//! Matches devices announced by a registry to the best available driver,
//! loads proposed drivers on demand, and reaps the modules it loaded once
//! nothing uses them any more.
//!
//! All state lives on one worker task. Registry callbacks are turned into
//! messages by [`ResolverHandle`], which is also how callers query status,
//! subscribe to [`ResolverEvent`](devmatch_kernel::ResolverEvent)s and shut
//! the worker down.

pub mod cache;
mod call;
mod engine;
mod handle;
pub mod lease;
mod mailbox;
pub mod mirror;
pub mod reaper;
pub mod record;
mod worker;

pub use cache::{DeviceKey, MatchCache};
pub use handle::{DeviceResolver, ResolverHandle, ResolverStatus, WorkerState};
pub use lease::LeaseTable;
pub use mirror::{DriverCandidate, DriverMirror};
pub use reaper::{ReapReport, Reaper};
pub use record::{MatchRecord, MatchScore, MatchSet};
