//! `devmatch simulate` command implementation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use devmatch_kernel::device::DEVICE_ID;
use devmatch_kernel::{DeviceRef, ResolverConfig, ResolverEvent};
use devmatch_resolver::{DeviceResolver, ResolverStatus};
use devmatch_testing::{MockDevice, MockModuleLoader, MockRegistry, MockSelector, SelectorPolicy};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, warn};

use crate::scenario::Scenario;

/// What a simulation produced.
pub struct Outcome {
    /// One line per resolver event, in publication order
    pub events: Vec<String>,
    pub status: ResolverStatus,
}

/// Execute the `devmatch simulate` command
pub async fn run(path: &Path, config: ResolverConfig, settle_ms: u64) -> anyhow::Result<()> {
    println!("{} Simulating {}", "->".green(), path.display().to_string().cyan());

    let scenario = Scenario::load(path)?;
    let outcome = execute(&scenario, config, Duration::from_millis(settle_ms)).await?;

    println!();
    for line in &outcome.events {
        println!("  {}", line);
    }
    println!();
    println!("{} Final status", "->".green());
    println!("{}", serde_json::to_string_pretty(&outcome.status)?);
    Ok(())
}

/// Replay `scenario` through a live resolver and collect what it did.
pub async fn execute(
    scenario: &Scenario,
    config: ResolverConfig,
    settle: Duration,
) -> anyhow::Result<Outcome> {
    let loader = MockModuleLoader::new();
    for module in &scenario.modules {
        let location = format!("{}{}", config.module_location_prefix, module.id);
        loader.provides(&location, module.build());
    }

    let (handle, worker) = DeviceResolver::new(config, loader.clone()).spawn();
    loader.set_listener(Arc::new(handle.clone()));
    let mut events = handle.subscribe();

    let registry = MockRegistry::new();
    handle.subscribe_to(registry.as_ref());

    for spec in &scenario.drivers {
        registry.publish_driver(&spec.build(), spec.ranking);
    }
    for spec in &scenario.locators {
        registry.publish_locator(Arc::new(spec.build()));
    }
    if let Some(preferred) = &scenario.prefer {
        registry.publish_selector(Arc::new(MockSelector::new(SelectorPolicy::Prefer(
            preferred.clone(),
        ))));
    }

    let mut labels: Vec<(DeviceRef, String)> = Vec::new();
    for (index, props) in scenario.devices.iter().enumerate() {
        let device = MockDevice::new(props.clone()).device_ref();
        let label = DeviceRef::persistent_id(props, DEVICE_ID)
            .unwrap_or_else(|| format!("device-{}", index + 1));
        labels.push((device.clone(), label));
        registry.publish_device(device);
    }

    tokio::time::sleep(settle).await;
    let status = handle.status().await?;
    handle.shutdown();
    worker.await?;

    let mut lines = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => lines.push(describe(&event, &labels)),
            Err(TryRecvError::Lagged(missed)) => warn!("Missed {} resolver events", missed),
            Err(e) => {
                debug!("Event stream finished: {}", e);
                break;
            }
        }
    }

    Ok(Outcome {
        events: lines,
        status,
    })
}

fn describe(event: &ResolverEvent, labels: &[(DeviceRef, String)]) -> String {
    let name = |device: &DeviceRef| {
        labels
            .iter()
            .find(|(d, _)| d == device)
            .map_or_else(|| format!("{device:?}"), |(_, label)| label.clone())
    };

    match event {
        ResolverEvent::DeviceFound { device } => format!("device found: {}", name(device)),
        ResolverEvent::DeviceLost { device } => format!("device lost: {}", name(device)),
        ResolverEvent::DriverFound { driver_id } => format!("driver found: {driver_id}"),
        ResolverEvent::DriverLost { driver_id } => format!("driver lost: {driver_id}"),
        ResolverEvent::AttachSucceeded { device, driver_id } => {
            format!("attached: {} -> {driver_id}", name(device))
        }
        ResolverEvent::AttachFailed {
            device,
            driver_id,
            error,
        } => format!("attach failed: {} -> {driver_id}: {error}", name(device)),
        ResolverEvent::Referred {
            device,
            driver_id,
            referral,
        } => format!("referred: {} by {driver_id} to {referral}", name(device)),
        ResolverEvent::NoDriverFound { device } => format!("no driver: {}", name(device)),
        ResolverEvent::ModuleInstalled { module } => format!("module installed: {module}"),
        ResolverEvent::ModuleUninstalled { module } => format!("module uninstalled: {module}"),
        other => format!("{other:?}"),
    }
}
