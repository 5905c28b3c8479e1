//! Match cache
//!
//! Remembers driver verdicts across resolution passes so that a device which
//! comes back is not matched against the same driver again. Entries are keyed
//! by driver id plus the device's persistent id when it has one, otherwise by
//! the device reference itself.
//!
//! Only device retraction frees entries, and only reference-keyed ones: a
//! persistent id outlives any particular reference to the device.

use std::collections::HashMap;

use devmatch_kernel::{DeviceRef, Properties};

/// How a device is identified in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// Stable identity shared by every reference to the same logical device
    Persistent(String),
    /// This exact reference
    Reference(DeviceRef),
}

impl DeviceKey {
    /// Prefer the persistent id property `key`, fall back to the reference.
    pub fn of(device: &DeviceRef, props: &Properties, key: &str) -> Self {
        match DeviceRef::persistent_id(props, key) {
            Some(id) => DeviceKey::Persistent(id),
            None => DeviceKey::Reference(device.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    driver_id: String,
    device: DeviceKey,
}

/// Driver verdicts keyed by (driver id, device identity).
#[derive(Debug, Default)]
pub struct MatchCache {
    entries: HashMap<CacheKey, i32>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, driver_id: &str, device: &DeviceKey) -> Option<i32> {
        let key = CacheKey {
            driver_id: driver_id.to_string(),
            device: device.clone(),
        };
        self.entries.get(&key).copied()
    }

    /// Insert or overwrite the verdict of `driver_id` for `device`.
    pub fn put(&mut self, driver_id: &str, device: DeviceKey, score: i32) {
        self.entries.insert(
            CacheKey {
                driver_id: driver_id.to_string(),
                device,
            },
            score,
        );
    }

    /// Drop every entry keyed by this exact reference. Returns how many went.
    pub fn invalidate_device(&mut self, device: &DeviceRef) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| !matches!(&key.device, DeviceKey::Reference(d) if d == device));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
