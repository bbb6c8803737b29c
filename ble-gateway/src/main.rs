mod bridge;
mod config;
mod discovery;

use crate::bridge::Bridge;
use crate::config::{get_mqtt_options, Config};
use backoff::ExponentialBackoff;
use bluez_async::{BluetoothEvent, BluetoothSession, DeviceEvent, DiscoveryFilter};
use btadvert::SensorData;
use futures::stream::StreamExt;
use futures::TryFutureExt;
use rumqttc::{AsyncClient, EventLoop};
use stable_eyre::eyre;
use std::time::Duration;
use tokio::{time, try_join};

const REQUESTS_CAP: usize = 10;
const MQTT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const SCAN_RESTART_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    stable_eyre::install()?;
    pretty_env_logger::init();
    color_backtrace::install();

    let config = Config::from_file()?;
    let mqtt_options = get_mqtt_options(config.mqtt);
    let (client, event_loop) = AsyncClient::new(mqtt_options, REQUESTS_CAP);
    let bridge = Bridge::new(client, &config.gateway);

    // Connect a Bluetooth session.
    let (dbus_handle, session) = BluetoothSession::new().await?;

    let scan_handle = run_scan_loop(bridge, &session);

    // Poll everything to completion, until the first one bombs out.
    let res: Result<_, eyre::Report> = try_join! {
        // If this ever finishes, we lost connection to D-Bus.
        dbus_handle.err_into(),
        // BLE scanning finished first.
        scan_handle,
        // MQTT event loop finished first.
        run_mqtt(event_loop),
    };
    res?;
    Ok(())
}

/// Drives the MQTT connection.
///
/// Publishes are fire-and-forget as far as the bridge is concerned, so
/// connection errors are logged here and the loop reconnects rather than
/// taking the gateway down.
async fn run_mqtt(mut event_loop: EventLoop) -> Result<(), eyre::Report> {
    loop {
        match event_loop.poll().await {
            Ok(event) => log::trace!("MQTT event: {event:?}"),
            Err(e) => {
                log::warn!("MQTT connection error: {e}");
                time::sleep(MQTT_RECONNECT_INTERVAL).await;
            }
        }
    }
}

/// Runs scan sessions forever, restarting after failures.
async fn run_scan_loop(
    mut bridge: Bridge,
    session: &BluetoothSession,
) -> Result<(), eyre::Report> {
    loop {
        // A fresh session must re-announce every device it sees.
        bridge.reset();
        if let Err(e) = run_scan_session(&mut bridge, session).await {
            log::warn!("Scan session ended: {e}");
            time::sleep(SCAN_RESTART_INTERVAL).await;
        }
    }
}

/// One scan session: subscribe to events, start discovery, then decode and
/// publish advertisements until the event stream closes or a publish fails.
async fn run_scan_session(
    bridge: &mut Bridge,
    session: &BluetoothSession,
) -> Result<(), eyre::Report> {
    let mut events = session.event_stream().await?;
    start_scan(session).await?;
    log::info!("BLE scanner running");

    while let Some(event) = events.next().await {
        let BluetoothEvent::Device { id, event } = event else {
            continue;
        };
        let data = match &event {
            DeviceEvent::ServiceData { service_data } => {
                SensorData::from_service_data(service_data)
            }
            DeviceEvent::ManufacturerData { manufacturer_data } => {
                SensorData::from_manufacturer_data(manufacturer_data)
            }
            _ => None,
        };
        let Some(data) = data else {
            continue;
        };
        // The advertisement itself carries no address, so look the device up.
        let info = match session.get_device_info(&id).await {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Failed to look up {id}: {e}");
                continue;
            }
        };
        bridge
            .report(
                &info.mac_address,
                info.rssi.unwrap_or_default(),
                data.into_reading(),
            )
            .await?;
    }

    Ok(())
}

/// Starts discovery, retrying until the Bluetooth stack is ready.
async fn start_scan(session: &BluetoothSession) -> Result<(), eyre::Report> {
    let filter = DiscoveryFilter {
        // Repeated broadcasts from the same device must all be delivered.
        duplicate_data: Some(true),
        ..DiscoveryFilter::default()
    };
    let backoff = ExponentialBackoff {
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };
    backoff::future::retry(backoff, || async {
        session
            .start_discovery_with_filter(&filter)
            .await
            .map_err(|e| {
                log::warn!("Failed to start scan: {e}");
                backoff::Error::transient(e)
            })
    })
    .await?;
    Ok(())
}
