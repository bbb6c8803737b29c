//! Home Assistant MQTT auto-discovery messages.
//!
//! For every measurable field of a reading (and the signal strength reported
//! alongside it) the gateway announces one retained config message, so that
//! Home Assistant creates the matching entity without manual setup.

use btadvert::bthome::{Field, Reading};
use serde_derive::Serialize;

/// A discovery message ready to be published: the config topic and the JSON
/// body describing one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub topic: String,
    pub payload: DescriptorPayload,
}

/// The body of a discovery message. Field names follow the abbreviated keys
/// Home Assistant accepts for MQTT discovery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DescriptorPayload {
    pub device: DeviceBlock,
    pub name: String,
    #[serde(rename = "stat_t")]
    pub state_topic: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    #[serde(rename = "stat_cla")]
    pub state_class: &'static str,
    #[serde(rename = "dev_cla")]
    pub device_class: &'static str,
    #[serde(rename = "unit_of_meas")]
    pub unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<&'static str>,
    pub value_template: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceBlock {
    pub name: String,
    pub identifiers: Vec<String>,
}

/// How a field maps onto a Home Assistant entity.
#[derive(Copy, Clone, Debug)]
struct EntityClass {
    device_class: &'static str,
    unit: &'static str,
    /// The per-entity segment of the config topic.
    subtopic: &'static str,
    entity_category: Option<&'static str>,
}

const RSSI_CLASS: EntityClass = EntityClass {
    device_class: "signal_strength",
    unit: "dBm",
    subtopic: "RSSI",
    entity_category: Some("diagnostic"),
};

fn entity_class(field: Field) -> Option<EntityClass> {
    match field {
        Field::Temperature => Some(EntityClass {
            device_class: "temperature",
            unit: "C",
            subtopic: "temperature",
            entity_category: None,
        }),
        Field::Humidity => Some(EntityClass {
            device_class: "humidity",
            unit: "%",
            subtopic: "humidity",
            entity_category: None,
        }),
        Field::Battery => Some(EntityClass {
            device_class: "battery",
            unit: "%",
            subtopic: "battery",
            entity_category: None,
        }),
        Field::Illuminance => Some(EntityClass {
            device_class: "illuminance",
            unit: "lx",
            subtopic: "illuminance",
            entity_category: None,
        }),
        Field::Pressure => Some(EntityClass {
            device_class: "atmospheric_pressure",
            unit: "hPa",
            subtopic: "atmospheric_pressure",
            entity_category: None,
        }),
        Field::PacketId
        | Field::Co2
        | Field::Voltage
        | Field::Dewpoint
        | Field::Moisture
        | Field::Rotation
        | Field::Button
        | Field::BatteryOk
        | Field::BatteryCharging
        | Field::CarbonMonoxide
        | Field::Cold
        | Field::Door
        | Field::GarageDoor
        | Field::Gas
        | Field::Heat
        | Field::Light
        | Field::Lock
        | Field::MoistureWarn
        | Field::Motion
        | Field::Window => None,
    }
}

/// Builds the discovery messages for a reading about to be published on
/// `state_topic`.
///
/// One message per describable field of the reading, plus one for the signal
/// strength which accompanies every state payload. Fields with no entity
/// mapping are skipped.
pub fn build_descriptors(
    discovery_prefix: &str,
    address: &str,
    topic_suffix: &str,
    state_topic: &str,
    reading: &Reading,
) -> Vec<Descriptor> {
    let device_name = format!("{address} {topic_suffix}");
    reading
        .iter()
        .filter_map(|(field, _)| entity_class(field).map(|class| (field.name(), class)))
        .chain(std::iter::once(("rssi", RSSI_CLASS)))
        .map(|(field_name, class)| Descriptor {
            topic: format!("{discovery_prefix}sensor/{address}/{}/config", class.subtopic),
            payload: DescriptorPayload {
                device: DeviceBlock {
                    name: device_name.clone(),
                    identifiers: vec![address.to_owned()],
                },
                name: device_name.clone(),
                state_topic: state_topic.to_owned(),
                unique_id: format!("{address}-{field_name}"),
                state_class: "measurement",
                device_class: class.device_class,
                unit_of_measurement: class.unit,
                entity_category: class.entity_category,
                value_template: format!("{{{{ value_json.{field_name} }}}}"),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor_reading() -> Reading {
        let mut reading = Reading::new();
        reading.insert(Field::Temperature, 21.5);
        reading.insert(Field::Humidity, 40.0);
        reading
    }

    #[test]
    fn descriptors_for_sensor_reading() {
        let descriptors = build_descriptors(
            "homeassistant/",
            "C73430352819",
            "sensor",
            "blegateway/C73430352819/sensor",
            &sensor_reading(),
        );
        assert_eq!(
            descriptors.iter().map(|d| d.topic.as_str()).collect::<Vec<_>>(),
            vec![
                "homeassistant/sensor/C73430352819/temperature/config",
                "homeassistant/sensor/C73430352819/humidity/config",
                "homeassistant/sensor/C73430352819/RSSI/config",
            ]
        );

        assert_eq!(
            serde_json::to_value(&descriptors[0].payload).unwrap(),
            json!({
                "device": {
                    "name": "C73430352819 sensor",
                    "identifiers": ["C73430352819"],
                },
                "name": "C73430352819 sensor",
                "stat_t": "blegateway/C73430352819/sensor",
                "uniq_id": "C73430352819-temperature",
                "stat_cla": "measurement",
                "dev_cla": "temperature",
                "unit_of_meas": "C",
                "value_template": "{{ value_json.temperature }}",
            })
        );
    }

    #[test]
    fn rssi_descriptor_is_diagnostic() {
        let descriptors = build_descriptors(
            "homeassistant/",
            "C73430352819",
            "sensor",
            "blegateway/C73430352819/sensor",
            &sensor_reading(),
        );
        let rssi = descriptors.last().unwrap();
        assert_eq!(rssi.payload.entity_category, Some("diagnostic"));
        assert_eq!(rssi.payload.device_class, "signal_strength");
        assert_eq!(rssi.payload.unit_of_measurement, "dBm");
        assert_eq!(rssi.payload.unique_id, "C73430352819-rssi");
        assert_eq!(rssi.payload.value_template, "{{ value_json.rssi }}");
    }

    #[test]
    fn pressure_config_topic_uses_device_class() {
        let mut reading = Reading::new();
        reading.insert(Field::Pressure, 1008.83);
        reading.insert(Field::Battery, 90.0);
        let descriptors = build_descriptors(
            "homeassistant/",
            "C73430352819",
            "sensor",
            "blegateway/C73430352819/sensor",
            &reading,
        );
        assert_eq!(
            descriptors[0].topic,
            "homeassistant/sensor/C73430352819/atmospheric_pressure/config"
        );
        // The unique id still uses the field name.
        assert_eq!(descriptors[0].payload.unique_id, "C73430352819-pressure");
    }

    #[test]
    fn undescribable_fields_are_skipped() {
        let mut reading = Reading::new();
        reading.insert(Field::Button, 1.0);
        reading.insert(Field::Lock, 0.0);
        let descriptors = build_descriptors(
            "homeassistant/",
            "C73430352819",
            "status",
            "blegateway/C73430352819/status",
            &reading,
        );
        // Only the signal-strength entity remains.
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].topic, "homeassistant/sensor/C73430352819/RSSI/config");
    }
}
