use async_trait::async_trait;
use devmatch_kernel::{DeviceRef, KernelError, KernelResult, MatchCandidate, Selection, Selector};
use parking_lot::RwLock;

/// How the mock selector decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPolicy {
    /// Return this fixed verdict
    Fixed(Selection),
    /// Pick the candidate with this driver id, or decline if absent
    Prefer(String),
    /// Fail the call
    Fail,
}

/// A selector with a scripted policy that remembers what it was shown.
pub struct MockSelector {
    policy: RwLock<SelectorPolicy>,
    seen: RwLock<Vec<Vec<MatchCandidate>>>,
}

impl MockSelector {
    pub fn new(policy: SelectorPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            seen: RwLock::new(Vec::new()),
        }
    }

    pub fn set_policy(&self, policy: SelectorPolicy) {
        *self.policy.write() = policy;
    }

    /// Candidate lists passed to each call, in call order.
    pub fn seen(&self) -> Vec<Vec<MatchCandidate>> {
        self.seen.read().clone()
    }
}

#[async_trait]
impl Selector for MockSelector {
    async fn select(
        &self,
        _device: &DeviceRef,
        candidates: &[MatchCandidate],
        _best: usize,
    ) -> KernelResult<Selection> {
        self.seen.write().push(candidates.to_vec());

        let policy = self.policy.read().clone();
        match policy {
            SelectorPolicy::Fixed(selection) => Ok(selection),
            SelectorPolicy::Prefer(id) => Ok(candidates
                .iter()
                .position(|c| c.driver_id == id)
                .map_or(Selection::None, Selection::Index)),
            SelectorPolicy::Fail => Err(KernelError::Selector("policy engine offline".to_string())),
        }
    }
}
