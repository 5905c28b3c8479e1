//! Locators suggest driver ids for a device before those drivers exist.

use std::fmt;
use std::sync::Arc;

use crate::device::Properties;
use crate::error::KernelResult;

#[async_trait::async_trait]
pub trait Locator: Send + Sync {
    /// Candidate driver ids for a device with these properties.
    async fn find_drivers(&self, props: &Properties) -> KernelResult<Vec<String>>;

    /// Bytes of the module implementing `driver_id`.
    async fn load_driver(&self, driver_id: &str) -> KernelResult<Vec<u8>>;
}

/// Registry-assigned locator identity plus the locator itself.
#[derive(Clone)]
pub struct LocatorRef {
    id: u64,
    inner: Arc<dyn Locator>,
}

impl LocatorRef {
    pub fn new(id: u64, locator: Arc<dyn Locator>) -> Self {
        Self { id, inner: locator }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::ops::Deref for LocatorRef {
    type Target = dyn Locator;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl PartialEq for LocatorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocatorRef {}

impl fmt::Debug for LocatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locator-{}", self.id)
    }
}

impl fmt::Display for LocatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
