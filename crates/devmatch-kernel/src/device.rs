//! Devices: published capability descriptors waiting for a driver.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::KernelResult;

/// Key-value property bag shared by devices and drivers.
pub type Properties = HashMap<String, serde_json::Value>;

/// Device category property.
pub const DEVICE_CATEGORY: &str = "category";

/// Default property carrying a device's persistent identity.
pub const DEVICE_ID: &str = "id";

/// A device published by the registry.
///
/// Implementations are owned by the registry; the resolver only keeps a
/// [`DeviceRef`] and takes one property snapshot per resolution attempt.
#[async_trait::async_trait]
pub trait Device: Send + Sync {
    /// Current property snapshot.
    async fn properties(&self) -> KernelResult<Properties>;

    /// Told once per resolution pass that ended without a driver.
    async fn no_driver_found(&self) -> KernelResult<()>;

    /// Whether a driver already claimed this device.
    fn is_in_use(&self) -> bool {
        false
    }
}

/// Reference-identity handle to a [`Device`].
///
/// Two handles are equal only if they point at the same device instance;
/// a re-announced device with the same persistent id is a different handle.
#[derive(Clone)]
pub struct DeviceRef(Arc<dyn Device>);

impl DeviceRef {
    pub fn new<D: Device + 'static>(device: D) -> Self {
        Self(Arc::new(device))
    }

    pub fn from_arc(device: Arc<dyn Device>) -> Self {
        Self(device)
    }

    /// Address used as the reference identity.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn device(&self) -> &dyn Device {
        self.0.as_ref()
    }

    /// Read the persistent identity out of a property snapshot.
    ///
    /// Strings are used verbatim, any other non-null value by its JSON text.
    pub fn persistent_id(props: &Properties, key: &str) -> Option<String> {
        match props.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl std::ops::Deref for DeviceRef {
    type Target = dyn Device;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for DeviceRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for DeviceRef {}

impl Hash for DeviceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceRef({:#x})", self.addr())
    }
}
