use bluez_async::{BluetoothEvent, BluetoothSession, DeviceEvent};
use btadvert::SensorData;
use futures::stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    pretty_env_logger::init();

    let (_, session) = BluetoothSession::new().await?;
    let mut events = session.event_stream().await?;

    // Start scanning for Bluetooth devices.
    session.start_discovery().await?;

    // Wait for events.
    while let Some(event) = events.next().await {
        if let BluetoothEvent::Device { id, event } = event {
            let data = match &event {
                DeviceEvent::ServiceData { service_data } => {
                    SensorData::from_service_data(service_data)
                }
                DeviceEvent::ManufacturerData { manufacturer_data } => {
                    SensorData::from_manufacturer_data(manufacturer_data)
                }
                _ => None,
            };
            if let Some(data) = data {
                println!("{}: {}", id, data);
            }
        }
    }

    Ok(())
}
