//! Leases protecting on-demand loaded modules from the reaper.

use std::collections::HashMap;
use std::time::Duration;

use devmatch_kernel::ModuleHandle;
use devmatch_kernel::config::MAX_PERIOD;
use tokio::time::Instant;

/// `now + ttl`, saturating at [`MAX_PERIOD`] from `now`.
pub fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_PERIOD)
}

/// Module id to lease expiry.
#[derive(Debug, Default)]
pub struct LeaseTable {
    expiries: HashMap<u64, Instant>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lease of `module` to end at `now + ttl`.
    pub fn grant(&mut self, module: &ModuleHandle, now: Instant, ttl: Duration) {
        self.expiries.insert(module.id, deadline_after(now, ttl));
    }

    /// Push the lease out to `now + ttl`; never shortens it.
    pub fn extend(&mut self, module: &ModuleHandle, now: Instant, ttl: Duration) {
        let expiry = deadline_after(now, ttl);
        self.expiries
            .entry(module.id)
            .and_modify(|e| *e = (*e).max(expiry))
            .or_insert(expiry);
    }

    pub fn expiry(&self, module: &ModuleHandle) -> Option<Instant> {
        self.expiries.get(&module.id).copied()
    }

    /// A lease ending exactly at `now` still holds.
    pub fn is_expired(&self, module: &ModuleHandle, now: Instant) -> bool {
        self.expiry(module).is_some_and(|expiry| expiry < now)
    }

    pub fn release(&mut self, module: &ModuleHandle) -> bool {
        self.expiries.remove(&module.id).is_some()
    }

    /// Forget leases of modules not in `live`.
    pub fn retain_modules(&mut self, live: &[ModuleHandle]) {
        self.expiries
            .retain(|id, _| live.iter().any(|module| module.id == *id));
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
