//! Reaper for on-demand loaded modules.
//!
//! Every tick looks at the modules carrying the on-demand location prefix:
//! modules in use get a long lease, fresh ones a short grace lease, and
//! unused modules whose lease ran out are uninstalled.

use std::time::Duration;

use devmatch_kernel::{KernelError, ModuleHandle, ModuleLoader, ResolverConfig, ResolverEvent};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::call::{guarded, guarded_infallible};
use crate::lease::LeaseTable;

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    pub extended: Vec<ModuleHandle>,
    pub granted: Vec<ModuleHandle>,
    pub uninstalled: Vec<ModuleHandle>,
    pub failed: Vec<ModuleHandle>,
}

#[derive(Debug, Clone)]
pub struct Reaper {
    prefix: String,
    short_lease: Duration,
    long_lease: Duration,
    call_timeout: Option<Duration>,
}

impl Reaper {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            prefix: config.module_location_prefix.clone(),
            short_lease: config.short_lease(),
            long_lease: config.long_lease(),
            call_timeout: config.call_timeout(),
        }
    }

    pub async fn tick(
        &self,
        now: Instant,
        loader: &dyn ModuleLoader,
        leases: &mut LeaseTable,
        events: &broadcast::Sender<ResolverEvent>,
    ) -> ReapReport {
        let mut report = ReapReport::default();

        let modules = match guarded_infallible("modules", self.call_timeout, loader.modules()).await
        {
            Ok(modules) => modules,
            Err(e) => {
                error!("Reaper could not list modules: {}", e);
                return report;
            }
        };

        for module in modules.iter().filter(|m| m.is_on_demand(&self.prefix)) {
            let in_use =
                guarded_infallible("is_in_use", self.call_timeout, loader.is_in_use(module))
                    .await
                    .unwrap_or(true);

            if in_use {
                leases.extend(module, now, self.long_lease);
                report.extended.push(module.clone());
            } else if leases.expiry(module).is_none() {
                leases.grant(module, now, self.short_lease);
                report.granted.push(module.clone());
            } else if leases.is_expired(module, now) {
                match guarded("uninstall", self.call_timeout, async {
                    loader.uninstall(module).await.map_err(KernelError::from)
                })
                .await
                {
                    Ok(()) => {
                        info!("Uninstalled idle module {}", module);
                        leases.release(module);
                        let _ = events.send(ResolverEvent::ModuleUninstalled {
                            module: module.clone(),
                        });
                        report.uninstalled.push(module.clone());
                    }
                    Err(e) => {
                        error!("Failed to uninstall module {}: {}", module, e);
                        report.failed.push(module.clone());
                    }
                }
            }
        }

        leases.retain_modules(&modules);
        debug!(
            "Reaper tick: {} extended, {} granted, {} uninstalled, {} failed",
            report.extended.len(),
            report.granted.len(),
            report.uninstalled.len(),
            report.failed.len()
        );
        report
    }
}
