//! A library for decoding environmental sensor readings from BLE
//! advertisements.

pub mod bthome;
pub mod switchbot;

use crate::bthome::{Field, Reading};
use log::warn;
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};
use uuid::Uuid;

/// Sensor data decoded from a single BLE advertisement, in whichever format
/// the broadcasting device uses.
#[derive(Clone, Debug, PartialEq)]
pub enum SensorData {
    BtHome(Reading),
    SwitchBot(switchbot::SensorReading),
}

impl SensorData {
    /// Tries to decode sensor data from the service data of an advertisement.
    ///
    /// Decode failures are logged and swallowed: one malformed advertisement
    /// must not interrupt the stream of subsequent ones. Payloads which
    /// decode to no fields at all are also dropped, as there is nothing to
    /// publish for them.
    pub fn from_service_data(service_data: &HashMap<Uuid, Vec<u8>>) -> Option<Self> {
        let data = service_data.get(&bthome::UUID)?;
        match bthome::decode(data) {
            Ok(reading) if !reading.is_empty() => Some(Self::BtHome(reading)),
            Ok(_) => None,
            Err(e) => {
                warn!("Error decoding sensor data: {e}");
                None
            }
        }
    }

    /// Tries to decode sensor data from the manufacturer data of an
    /// advertisement.
    pub fn from_manufacturer_data(manufacturer_data: &HashMap<u16, Vec<u8>>) -> Option<Self> {
        let data = manufacturer_data.get(&switchbot::COMPANY_ID)?;
        switchbot::SensorReading::decode(data).map(Self::SwitchBot)
    }

    /// Converts the sensor data into a uniform field-to-value reading, ready
    /// for classification and publication.
    pub fn into_reading(self) -> Reading {
        match self {
            Self::BtHome(reading) => reading,
            Self::SwitchBot(switchbot) => {
                let mut reading = Reading::new();
                reading.insert(Field::Temperature, switchbot.temperature.into());
                reading.insert(Field::Humidity, switchbot.humidity.into());
                reading
            }
        }
    }
}

impl Display for SensorData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::BtHome(reading) => reading.fmt(f),
            Self::SwitchBot(reading) => reading.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_no_matching_service_data() {
        let empty_service_data = HashMap::new();
        assert_eq!(SensorData::from_service_data(&empty_service_data), None);
    }

    #[test]
    fn decode_empty_payload() {
        // An empty payload decodes to an empty reading, which has nothing to
        // publish.
        let service_data = [(bthome::UUID, vec![])].into_iter().collect();
        assert_eq!(SensorData::from_service_data(&service_data), None);
    }

    #[test]
    fn decode_invalid_payload() {
        // Truncated temperature value.
        let service_data = [(bthome::UUID, vec![0x02, 0xc4])].into_iter().collect();
        assert_eq!(SensorData::from_service_data(&service_data), None);
    }

    #[test]
    fn decode_valid_service_data() {
        let service_data = [(bthome::UUID, vec![0x02, 0xc4, 0x09, 0x03, 0xbf, 0x13])]
            .into_iter()
            .collect();
        let data = SensorData::from_service_data(&service_data).unwrap();
        let reading = data.into_reading();
        assert_eq!(reading.get(Field::Temperature), Some(2500.0 * 0.01));
        assert_eq!(reading.get(Field::Humidity), Some(5055.0 * 0.01));
    }

    #[test]
    fn decode_no_matching_manufacturer_data() {
        let manufacturer_data = [(0x0499, vec![0x05, 0x12, 0xfc])].into_iter().collect();
        assert_eq!(
            SensorData::from_manufacturer_data(&manufacturer_data),
            None
        );
    }

    #[test]
    fn decode_valid_manufacturer_data() {
        let manufacturer_data = [(
            switchbot::COMPANY_ID,
            vec![0xc7, 0x34, 0x30, 0x35, 0x28, 0x19, 0x00, 0x64, 3, 0x80 | 21, 45],
        )]
        .into_iter()
        .collect();
        let data = SensorData::from_manufacturer_data(&manufacturer_data).unwrap();
        assert_eq!(
            data,
            SensorData::SwitchBot(switchbot::SensorReading {
                mac: [0xc7, 0x34, 0x30, 0x35, 0x28, 0x19],
                temperature: 21.3,
                humidity: 45,
            })
        );

        // SwitchBot readings flatten to temperature and humidity fields, so
        // they classify as a multi-field environmental sensor.
        let reading = data.into_reading();
        assert_eq!(reading.topic_suffix(), Some("sensor"));
        assert_eq!(reading.get(Field::Humidity), Some(45.0));
    }
}
