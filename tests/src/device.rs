use async_trait::async_trait;
use devmatch_kernel::device::{DEVICE_CATEGORY, DEVICE_ID};
use devmatch_kernel::{Device, DeviceRef, KernelError, KernelResult, Properties};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A device with a fixed property bag.
///
/// Counts how often it was told that no driver could be found and can be
/// switched into failure or "in use" modes.
pub struct MockDevice {
    properties: RwLock<Properties>,
    no_driver_calls: AtomicUsize,
    property_reads: AtomicUsize,
    fail_properties: AtomicBool,
    in_use: AtomicBool,
}

impl MockDevice {
    pub fn new(properties: Properties) -> Arc<Self> {
        Arc::new(Self {
            properties: RwLock::new(properties),
            no_driver_calls: AtomicUsize::new(0),
            property_reads: AtomicUsize::new(0),
            fail_properties: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
        })
    }

    /// A device with a category and a persistent id.
    pub fn with_id(category: &str, id: &str) -> Arc<Self> {
        let mut props = Properties::new();
        props.insert(DEVICE_CATEGORY.to_string(), serde_json::Value::from(category));
        props.insert(DEVICE_ID.to_string(), serde_json::Value::from(id));
        Self::new(props)
    }

    /// A device without persistent id; the cache keys it by reference.
    pub fn anonymous(category: &str) -> Arc<Self> {
        let mut props = Properties::new();
        props.insert(DEVICE_CATEGORY.to_string(), serde_json::Value::from(category));
        Self::new(props)
    }

    pub fn device_ref(self: &Arc<Self>) -> DeviceRef {
        DeviceRef::from_arc(self.clone())
    }

    pub fn set_property(&self, key: &str, value: serde_json::Value) {
        self.properties.write().insert(key.to_string(), value);
    }

    pub fn set_fail_properties(&self, fail: bool) {
        self.fail_properties.store(fail, Ordering::SeqCst);
    }

    pub fn set_in_use(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::SeqCst);
    }

    pub fn no_driver_calls(&self) -> usize {
        self.no_driver_calls.load(Ordering::SeqCst)
    }

    pub fn property_reads(&self) -> usize {
        self.property_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn properties(&self) -> KernelResult<Properties> {
        self.property_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_properties.load(Ordering::SeqCst) {
            return Err(KernelError::Device("properties unavailable".to_string()));
        }
        Ok(self.properties.read().clone())
    }

    async fn no_driver_found(&self) -> KernelResult<()> {
        self.no_driver_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }
}
