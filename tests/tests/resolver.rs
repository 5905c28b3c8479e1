use std::sync::Arc;
use std::time::Duration;

use devmatch_kernel::device::DEVICE_CATEGORY;
use devmatch_kernel::driver::DRIVER_ID;
use devmatch_kernel::{DeviceEvent, ResolverConfig, ResolverEvent};
use devmatch_resolver::{DeviceResolver, ResolverHandle, WorkerState};
use devmatch_testing::{
    MockDevice, MockDriver, MockLocator, MockModuleLoader, MockRegistry, MockSelector,
    SelectorPolicy, assert_attached, assert_matched,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Generous enough for the paused-clock tests, which skip whole reaper cycles.
const WAIT: Duration = Duration::from_secs(60 * 60);

fn start(config: ResolverConfig) -> (ResolverHandle, JoinHandle<()>, Arc<MockModuleLoader>) {
    let loader = MockModuleLoader::new();
    let (handle, task) = DeviceResolver::new(config, loader.clone()).spawn();
    loader.set_listener(Arc::new(handle.clone()));
    (handle, task, loader)
}

/// Next event satisfying `pred`, skipping the rest.
async fn next_event(
    rx: &mut broadcast::Receiver<ResolverEvent>,
    pred: impl Fn(&ResolverEvent) -> bool,
) -> ResolverEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream broke: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for resolver event")
}

fn attached_to(driver: &'static str) -> impl Fn(&ResolverEvent) -> bool {
    move |e| matches!(e, ResolverEvent::AttachSucceeded { driver_id, .. } if driver_id == driver)
}

fn no_driver(e: &ResolverEvent) -> bool {
    matches!(e, ResolverEvent::NoDriverFound { .. })
}

#[tokio::test]
async fn thermostat_picks_best_driver_and_reuses_scores() {
    let registry = MockRegistry::new();
    let a = Arc::new(MockDriver::new("drv-a", 10));
    let b = Arc::new(MockDriver::new("drv-b", 40));
    registry.publish_driver(&a, 0);
    registry.publish_driver(&b, 5);

    let (handle, task, _loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let first = MockDevice::with_id("thermostat", "dev-1").device_ref();
    registry.publish_device(first.clone());
    next_event(&mut events, attached_to("drv-b")).await;

    registry.retract_device(&first);
    let second = MockDevice::with_id("thermostat", "dev-1").device_ref();
    registry.publish_device(second.clone());
    next_event(&mut events, attached_to("drv-b")).await;

    assert_matched!(a, 1);
    assert_matched!(b, 1);
    assert_attached!(a, 0);
    assert_eq!(b.attached(), vec![first, second]);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn new_driver_retries_devices_without_one() {
    let registry = MockRegistry::new();
    let (handle, task, _loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let device = MockDevice::with_id("lamp", "lamp-7");
    registry.publish_device(device.device_ref());
    next_event(&mut events, no_driver).await;
    assert_eq!(handle.status().await.unwrap().idle_devices, 1);

    let driver = Arc::new(MockDriver::new("drv-lamp", 3));
    registry.publish_driver(&driver, 0);
    next_event(&mut events, attached_to("drv-lamp")).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.idle_devices, 0);
    assert_eq!(status.pending_devices, 0);
    assert_eq!(status.drivers, 1);
    assert_eq!(device.no_driver_calls(), 1);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn modified_device_is_resolved_again() {
    let registry = MockRegistry::new();
    let (handle, task, loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let driver = Arc::new(MockDriver::new("drv-x", 25));
    loader.provides("_DD_drv-x", driver.clone());
    registry.publish_locator(Arc::new(
        MockLocator::new()
            .with_hint("drv-x")
            .for_category("sensor")
            .with_module("drv-x", b"bytes"),
    ));

    let device = MockDevice::with_id("lamp", "dev-9");
    registry.publish_device(device.device_ref());
    next_event(&mut events, no_driver).await;
    assert_eq!(handle.status().await.unwrap().idle_devices, 1);

    // Nothing else changes; only the modification brings the device back.
    device.set_property(DEVICE_CATEGORY, serde_json::json!("sensor"));
    registry.modify_device(&device.device_ref());
    next_event(&mut events, attached_to("drv-x")).await;

    assert_attached!(driver, 1);
    assert_eq!(device.no_driver_calls(), 1);
    let status = handle.status().await.unwrap();
    assert_eq!(status.idle_devices, 0);
    assert_eq!(status.pending_devices, 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn repeated_announcements_queue_one_pass() {
    let (handle, task, _loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();

    let device = MockDevice::with_id("lamp", "lamp-1");
    let device_ref = device.device_ref();
    handle.notify(DeviceEvent::Added(device_ref.clone()));
    handle.notify(DeviceEvent::Added(device_ref.clone()));
    handle.notify(DeviceEvent::Modified(device_ref.clone()));

    // Answered while draining the inbox, before the first pass starts.
    assert_eq!(handle.status().await.unwrap().pending_devices, 1);

    next_event(&mut events, no_driver).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.pending_devices, 0);
    assert_eq!(status.idle_devices, 1);
    assert_eq!(device.no_driver_calls(), 1);
    assert_eq!(device.property_reads(), 1);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn registration_without_driver_id_is_ignored() {
    let registry = MockRegistry::new();
    let (handle, task, _loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let nameless = Arc::new(MockDriver::new("nameless", 99));
    let mut registration = nameless.registration(50, 50);
    registration.properties.remove(DRIVER_ID);
    registry.publish_registration(registration);

    registry.publish_device(MockDevice::with_id("lamp", "lamp-2").device_ref());
    next_event(&mut events, no_driver).await;

    assert_eq!(handle.status().await.unwrap().drivers, 0);
    assert_matched!(nameless, 0);
    assert_attached!(nameless, 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn retracting_a_device_drops_its_cache_entries() {
    let registry = MockRegistry::new();
    let driver = Arc::new(MockDriver::new("drv-a", 0));
    registry.publish_driver(&driver, 0);

    let (handle, task, _loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let device = MockDevice::anonymous("lamp").device_ref();
    registry.publish_device(device.clone());
    next_event(&mut events, no_driver).await;
    assert_eq!(handle.status().await.unwrap().cache_entries, 1);

    registry.retract_device(&device);
    next_event(&mut events, |e| matches!(e, ResolverEvent::DeviceLost { .. })).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.cache_entries, 0);
    assert_eq!(status.idle_devices, 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn selector_and_locator_changes_are_tracked() {
    let registry = MockRegistry::new();
    let (handle, task, _loader) = start(ResolverConfig::default());
    handle.subscribe_to(registry.as_ref());

    let locator = registry.publish_locator(Arc::new(MockLocator::new()));
    registry.publish_selector(Arc::new(MockSelector::new(SelectorPolicy::Fail)));

    let status = handle.status().await.unwrap();
    assert_eq!(status.locators, 1);
    assert_eq!(status.selectors, 1);
    assert_eq!(status.state, WorkerState::Idle);

    registry.retract_locator(locator);
    assert_eq!(handle.status().await.unwrap().locators, 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn on_demand_module_is_reaped_after_use() {
    let registry = MockRegistry::new();
    let config = ResolverConfig::default().with_reaper_interval(Duration::from_secs(60));
    let (handle, task, loader) = start(config);
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let driver = Arc::new(MockDriver::new("drv-x", 7));
    loader.provides("_DD_drv-x", driver.clone());
    registry.publish_locator(Arc::new(
        MockLocator::new()
            .with_hint("drv-x")
            .with_module("drv-x", b"module bytes"),
    ));

    registry.publish_device(MockDevice::with_id("sensor", "s-1").device_ref());
    let installed = match next_event(&mut events, |e| {
        matches!(e, ResolverEvent::ModuleInstalled { .. })
    })
    .await
    {
        ResolverEvent::ModuleInstalled { module } => module,
        other => panic!("unexpected event {other:?}"),
    };
    next_event(&mut events, attached_to("drv-x")).await;
    assert_eq!(handle.status().await.unwrap().leased_modules, 1);

    // Long lease after the attach, then unloaded by a reaper tick.
    let started = tokio::time::Instant::now();
    let uninstalled = match next_event(&mut events, |e| {
        matches!(e, ResolverEvent::ModuleUninstalled { .. })
    })
    .await
    {
        ResolverEvent::ModuleUninstalled { module } => module,
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(uninstalled, installed);
    assert!(started.elapsed() >= Duration::from_secs(15 * 60));

    next_event(&mut events, |e| {
        matches!(e, ResolverEvent::DriverLost { driver_id } if driver_id == "drv-x")
    })
    .await;
    assert_eq!(loader.uninstalls(), vec![installed]);
    assert_eq!(handle.status().await.unwrap().leased_modules, 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn module_in_use_survives_reaper() {
    let registry = MockRegistry::new();
    let (handle, task, loader) = start(ResolverConfig::default());
    let mut events = handle.subscribe();
    handle.subscribe_to(registry.as_ref());

    let driver = Arc::new(MockDriver::new("drv-x", 7));
    loader.provides("_DD_drv-x", driver.clone());
    registry.publish_locator(Arc::new(
        MockLocator::new().with_hint("drv-x").with_module("drv-x", b"bytes"),
    ));
    registry.publish_device(MockDevice::with_id("sensor", "s-1").device_ref());
    next_event(&mut events, attached_to("drv-x")).await;

    let module = loader.module_at("_DD_drv-x").unwrap();
    loader.set_in_use(&module, true);

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert!(loader.uninstalls().is_empty());

    loader.set_in_use(&module, false);
    next_event(&mut events, |e| {
        matches!(e, ResolverEvent::ModuleUninstalled { .. })
    })
    .await;

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn status_racing_shutdown_reports_stopped() {
    let (handle, task, _loader) = start(ResolverConfig::default());
    assert_eq!(handle.status().await.unwrap().state, WorkerState::Idle);

    handle.shutdown();
    let status = handle.status().await.unwrap();
    assert_eq!(status.state, WorkerState::Stopped);

    task.await.unwrap();
    assert!(handle.status().await.is_err());
}

#[tokio::test]
async fn shutdown_stops_the_worker() {
    let (handle, task, _loader) = start(ResolverConfig::default());
    assert_eq!(handle.status().await.unwrap().state, WorkerState::Idle);

    handle.shutdown();
    assert!(handle.is_shutdown());
    task.await.unwrap();

    assert!(handle.status().await.is_err());
    // Notifications after shutdown are dropped quietly.
    handle.notify(devmatch_kernel::DeviceEvent::Added(
        MockDevice::anonymous("lamp").device_ref(),
    ));
}
