//! External selection policy overriding the built-in tie-break.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::DeviceRef;
use crate::error::KernelResult;

/// One viable candidate as presented to a [`Selector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub driver_id: String,
    pub score: i32,
    pub ranking: i32,
    pub sequence_id: i64,
}

/// A selector's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Attach the candidate at this index
    Index(usize),
    /// Attach nothing; the device is reported as having no driver
    None,
}

#[async_trait::async_trait]
pub trait Selector: Send + Sync {
    /// Pick among `candidates`, which are ordered best first.
    /// `best` is the index the resolver would pick on its own.
    async fn select(
        &self,
        device: &DeviceRef,
        candidates: &[MatchCandidate],
        best: usize,
    ) -> KernelResult<Selection>;
}

/// Registry-assigned selector identity plus the selector itself.
#[derive(Clone)]
pub struct SelectorRef {
    id: u64,
    inner: Arc<dyn Selector>,
}

impl SelectorRef {
    pub fn new(id: u64, selector: Arc<dyn Selector>) -> Self {
        Self {
            id,
            inner: selector,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::ops::Deref for SelectorRef {
    type Target = dyn Selector;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl PartialEq for SelectorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SelectorRef {}

impl fmt::Debug for SelectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "selector-{}", self.id)
    }
}
