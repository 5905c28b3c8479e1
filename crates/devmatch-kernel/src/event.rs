//! Resolver events published for tooling and tests.

use crate::device::DeviceRef;
use crate::module::ModuleHandle;

/// Something observable the resolver did.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ResolverEvent {
    /// A device was announced
    DeviceFound { device: DeviceRef },
    /// A device was retracted
    DeviceLost { device: DeviceRef },
    /// A driver joined the mirror
    DriverFound { driver_id: String },
    /// A driver left the mirror
    DriverLost { driver_id: String },
    /// A driver attached to a device
    AttachSucceeded { device: DeviceRef, driver_id: String },
    /// A driver's attach routine failed
    AttachFailed {
        device: DeviceRef,
        driver_id: String,
        error: String,
    },
    /// A driver referred the device to another driver id
    Referred {
        device: DeviceRef,
        driver_id: String,
        referral: String,
    },
    /// A resolution pass ended without a driver
    NoDriverFound { device: DeviceRef },
    /// A module was installed on demand
    ModuleInstalled { module: ModuleHandle },
    /// A module was unloaded by the reaper
    ModuleUninstalled { module: ModuleHandle },
}

impl ResolverEvent {
    /// Whether this event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, ResolverEvent::AttachFailed { .. })
    }

    /// Device the event concerns, if any.
    pub fn device(&self) -> Option<&DeviceRef> {
        match self {
            ResolverEvent::DeviceFound { device }
            | ResolverEvent::DeviceLost { device }
            | ResolverEvent::AttachSucceeded { device, .. }
            | ResolverEvent::AttachFailed { device, .. }
            | ResolverEvent::Referred { device, .. }
            | ResolverEvent::NoDriverFound { device } => Some(device),
            _ => None,
        }
    }
}
