//! Support for the manufacturer-data format broadcast by the SwitchBot
//! Indoor/Outdoor Thermo-Hygrometer.

use std::fmt::{self, Display, Formatter};

/// The [Bluetooth company identifier](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/)
/// of Woan Technology (SwitchBot).
pub const COMPANY_ID: u16 = 0x0969;

/// A temperature and humidity reading from a SwitchBot meter.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub mac: [u8; 6],
    /// Temperature in °C.
    pub temperature: f32,
    /// Relative humidity as a percentage.
    pub humidity: u8,
}

impl SensorReading {
    /// Tries to decode the given bytestring (manufacturer data for
    /// [`COMPANY_ID`] in a BLE advertisement) as a sensor reading.
    ///
    /// Returns `None` if the payload is too short to contain one. The
    /// temperature is sign-magnitude rather than two's-complement: bit 7 of
    /// the integer byte set means positive, and the preceding byte carries
    /// tenths of a degree.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 11 {
            return None;
        }
        let mac = data[0..6].try_into().unwrap();
        let sign = if data[9] & 0x80 != 0 { 1.0 } else { -1.0 };
        let temperature = sign * (f32::from(data[9] & 0x7f) + f32::from(data[8]) * 0.1);
        let humidity = data[10] & 0x7f;
        Some(Self {
            mac,
            temperature,
            humidity,
        })
    }
}

impl Display for SensorReading {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}: {:0.1}°C, {}% humidity",
            self.mac[0],
            self.mac[1],
            self.mac[2],
            self.mac[3],
            self.mac[4],
            self.mac[5],
            self.temperature,
            self.humidity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_positive_temperature() {
        // 21.3°C, 45% humidity.
        let decoded = SensorReading::decode(&[
            0xc7, 0x34, 0x30, 0x35, 0x28, 0x19, 0x00, 0x64, 3, 0x80 | 21, 45,
        ])
        .unwrap();
        assert_eq!(
            decoded,
            SensorReading {
                mac: [0xc7, 0x34, 0x30, 0x35, 0x28, 0x19],
                temperature: 21.3,
                humidity: 45,
            }
        );
    }

    #[test]
    fn decode_negative_temperature() {
        // -5.2°C, 87% humidity.
        let decoded = SensorReading::decode(&[
            0xc7, 0x34, 0x30, 0x35, 0x28, 0x19, 0x00, 0x64, 2, 5, 87,
        ])
        .unwrap();
        assert_eq!(decoded.temperature, -5.2);
        assert_eq!(decoded.humidity, 87);
    }

    #[test]
    fn humidity_ignores_high_bit() {
        let decoded = SensorReading::decode(&[
            0xc7, 0x34, 0x30, 0x35, 0x28, 0x19, 0x00, 0x64, 0, 0x80 | 20, 0x80 | 45,
        ])
        .unwrap();
        assert_eq!(decoded.humidity, 45);
    }

    #[test]
    fn decode_short() {
        assert_eq!(SensorReading::decode(&[]), None);
        assert_eq!(SensorReading::decode(&[0xc7, 0x34, 0x30, 0x35, 0x28]), None);
    }

    #[test]
    fn format_reading() {
        assert_eq!(
            SensorReading {
                mac: [0xc7, 0x34, 0x30, 0x35, 0x28, 0x19],
                temperature: 21.3,
                humidity: 45,
            }
            .to_string(),
            "c7:34:30:35:28:19: 21.3°C, 45% humidity"
        );
    }
}
