use async_trait::async_trait;
use devmatch_kernel::{DriverEvent, ModuleError, ModuleHandle, ModuleLoader, ProviderId, RegistryListener};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use crate::driver::MockDriver;

/// Provider ids handed out for drivers announced by installed modules.
const MODULE_PROVIDER_BASE: u64 = 10_000;

/// An in-memory module loader.
///
/// Installing a location registered with [`provides`](Self::provides)
/// announces that driver to the listener, the way starting a real module
/// registers its services; uninstalling retracts it again.
pub struct MockModuleLoader {
    next_id: AtomicU64,
    installed: RwLock<Vec<ModuleHandle>>,
    in_use: RwLock<HashSet<u64>>,
    contents: RwLock<HashMap<String, Arc<MockDriver>>>,
    announced: RwLock<HashMap<u64, ProviderId>>,
    listener: RwLock<Option<Arc<dyn RegistryListener>>>,
    installs: RwLock<Vec<String>>,
    uninstalls: RwLock<Vec<ModuleHandle>>,
    fail_install: AtomicBool,
    fail_uninstall: AtomicBool,
}

impl Default for MockModuleLoader {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            installed: RwLock::new(Vec::new()),
            in_use: RwLock::new(HashSet::new()),
            contents: RwLock::new(HashMap::new()),
            announced: RwLock::new(HashMap::new()),
            listener: RwLock::new(None),
            installs: RwLock::new(Vec::new()),
            uninstalls: RwLock::new(Vec::new()),
            fail_install: AtomicBool::new(false),
            fail_uninstall: AtomicBool::new(false),
        }
    }
}

impl MockModuleLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Installing `location` makes `driver` available.
    pub fn provides(&self, location: &str, driver: Arc<MockDriver>) {
        self.contents.write().insert(location.to_string(), driver);
    }

    /// Where driver announcements go.
    pub fn set_listener(&self, listener: Arc<dyn RegistryListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn set_fail_install(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_uninstall(&self, fail: bool) {
        self.fail_uninstall.store(fail, Ordering::SeqCst);
    }

    pub fn set_in_use(&self, module: &ModuleHandle, in_use: bool) {
        if in_use {
            self.in_use.write().insert(module.id);
        } else {
            self.in_use.write().remove(&module.id);
        }
    }

    /// Pretend a module was installed by someone else, e.g. a previous run.
    pub fn preinstall(&self, location: &str) -> ModuleHandle {
        let handle = ModuleHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst), location);
        self.installed.write().push(handle.clone());
        handle
    }

    pub fn module_at(&self, location: &str) -> Option<ModuleHandle> {
        self.installed
            .read()
            .iter()
            .find(|m| m.location == location)
            .cloned()
    }

    /// Locations passed to `install`, including failed attempts.
    pub fn installs(&self) -> Vec<String> {
        self.installs.read().clone()
    }

    pub fn uninstalls(&self) -> Vec<ModuleHandle> {
        self.uninstalls.read().clone()
    }

    fn announce(&self, event: DriverEvent) {
        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => listener.on_driver_changed(event),
            None => debug!("No listener for module driver event {:?}", event),
        }
    }
}

#[async_trait]
impl ModuleLoader for MockModuleLoader {
    async fn install(&self, location: &str, _bytes: Vec<u8>) -> Result<ModuleHandle, ModuleError> {
        self.installs.write().push(location.to_string());
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(ModuleError::InstallFailed {
                location: location.to_string(),
                message: "corrupt module".to_string(),
            });
        }

        let handle = ModuleHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst), location);
        self.installed.write().push(handle.clone());

        let driver = self.contents.read().get(location).cloned();
        if let Some(driver) = driver {
            let provider = MODULE_PROVIDER_BASE + handle.id;
            self.announced.write().insert(handle.id, ProviderId(provider));
            self.announce(DriverEvent::Added(driver.registration_in(
                provider,
                provider as i64,
                handle.clone(),
            )));
        }
        Ok(handle)
    }

    async fn uninstall(&self, module: &ModuleHandle) -> Result<(), ModuleError> {
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(ModuleError::UninstallFailed {
                location: module.location.clone(),
                message: "module busy".to_string(),
            });
        }

        {
            let mut installed = self.installed.write();
            let before = installed.len();
            installed.retain(|m| m.id != module.id);
            if installed.len() == before {
                return Err(ModuleError::NotFound(module.location.clone()));
            }
        }
        self.uninstalls.write().push(module.clone());

        let provider = self.announced.write().remove(&module.id);
        if let Some(provider) = provider {
            self.announce(DriverEvent::Removed(provider));
        }
        Ok(())
    }

    async fn modules(&self) -> Vec<ModuleHandle> {
        self.installed.read().clone()
    }

    async fn is_in_use(&self, module: &ModuleHandle) -> bool {
        self.in_use.read().contains(&module.id)
    }
}
