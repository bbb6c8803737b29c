//! Support for the [BTHome](https://bthome.io/)-style type-value format used by
//! BLE environmental sensors, and the topic classification heuristic for
//! decoded readings.

use bluez_async::uuid_from_u16;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

pub const UUID: Uuid = uuid_from_u16(0xfcd2);

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("Premature end of data decoding {field}")]
    PrematureEnd { field: Field },
    #[error("Unsupported value size {0}")]
    UnsupportedSize(u8),
}

/// The kinds of measurement a sensor can broadcast.
///
/// Several table entries may map to the same field, with different sizes and
/// scale factors. [`Field::name`] is the key used in published JSON payloads
/// and topic names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    // Misc data.
    PacketId,

    // Sensor data.
    Battery,
    Co2,
    Voltage,
    Dewpoint,
    Humidity,
    Illuminance,
    Moisture,
    Pressure,
    Temperature,
    Rotation,

    // Selector.
    Button,

    // Binary sensor data.
    BatteryOk,
    BatteryCharging,
    CarbonMonoxide,
    Cold,
    Door,
    GarageDoor,
    Gas,
    Heat,
    Light,
    Lock,
    MoistureWarn,
    Motion,
    Window,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Self::PacketId => "pid",
            Self::Battery => "battery",
            Self::Co2 => "co2",
            Self::Voltage => "voltage",
            Self::Dewpoint => "dewpoint",
            Self::Humidity => "humidity",
            Self::Illuminance => "illuminance",
            Self::Moisture => "moisture",
            Self::Pressure => "pressure",
            Self::Temperature => "temperature",
            Self::Rotation => "rotation",
            Self::Button => "button",
            Self::BatteryOk => "battery_ok",
            Self::BatteryCharging => "battery_charging",
            Self::CarbonMonoxide => "co",
            Self::Cold => "cold",
            Self::Door => "door",
            Self::GarageDoor => "garage_door",
            Self::Gas => "gas",
            Self::Heat => "heat",
            Self::Light => "light",
            Self::Lock => "lock",
            Self::MoistureWarn => "moisture_warn",
            Self::Motion => "motion",
            Self::Window => "window",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the field table: how to extract and scale the value for a given
/// type identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub id: u8,
    pub size: u8,
    pub signed: bool,
    pub scale: f64,
    pub field: Field,
}

/// The default field table. The format has no per-field length byte, so the
/// value size is implied by the identifier.
pub const FIELD_TABLE: &[FieldSpec] = &[
    FieldSpec { id: 0x00, size: 1, signed: false, scale: 1.0, field: Field::PacketId },
    FieldSpec { id: 0x01, size: 1, signed: false, scale: 1.0, field: Field::Battery },
    FieldSpec { id: 0x12, size: 2, signed: false, scale: 1.0, field: Field::Co2 },
    FieldSpec { id: 0x0c, size: 2, signed: false, scale: 0.001, field: Field::Voltage },
    FieldSpec { id: 0x4a, size: 2, signed: false, scale: 0.1, field: Field::Voltage },
    FieldSpec { id: 0x08, size: 2, signed: true, scale: 0.01, field: Field::Dewpoint },
    FieldSpec { id: 0x03, size: 2, signed: false, scale: 0.01, field: Field::Humidity },
    FieldSpec { id: 0x2e, size: 1, signed: false, scale: 1.0, field: Field::Humidity },
    FieldSpec { id: 0x05, size: 3, signed: false, scale: 0.01, field: Field::Illuminance },
    FieldSpec { id: 0x14, size: 2, signed: false, scale: 0.01, field: Field::Moisture },
    FieldSpec { id: 0x2f, size: 1, signed: false, scale: 1.0, field: Field::Moisture },
    FieldSpec { id: 0x04, size: 3, signed: false, scale: 0.01, field: Field::Pressure },
    FieldSpec { id: 0x45, size: 2, signed: true, scale: 0.1, field: Field::Temperature },
    FieldSpec { id: 0x02, size: 2, signed: true, scale: 0.01, field: Field::Temperature },
    FieldSpec { id: 0x3f, size: 2, signed: true, scale: 0.1, field: Field::Rotation },
    FieldSpec { id: 0x3a, size: 1, signed: false, scale: 1.0, field: Field::Button },
    FieldSpec { id: 0x15, size: 1, signed: false, scale: 1.0, field: Field::BatteryOk },
    FieldSpec { id: 0x16, size: 1, signed: false, scale: 1.0, field: Field::BatteryCharging },
    FieldSpec { id: 0x17, size: 1, signed: false, scale: 1.0, field: Field::CarbonMonoxide },
    FieldSpec { id: 0x18, size: 1, signed: false, scale: 1.0, field: Field::Cold },
    FieldSpec { id: 0x1a, size: 1, signed: false, scale: 1.0, field: Field::Door },
    FieldSpec { id: 0x1b, size: 1, signed: false, scale: 1.0, field: Field::GarageDoor },
    FieldSpec { id: 0x1c, size: 1, signed: false, scale: 1.0, field: Field::Gas },
    FieldSpec { id: 0x1d, size: 1, signed: false, scale: 1.0, field: Field::Heat },
    FieldSpec { id: 0x1e, size: 1, signed: false, scale: 1.0, field: Field::Light },
    FieldSpec { id: 0x1f, size: 1, signed: false, scale: 1.0, field: Field::Lock },
    FieldSpec { id: 0x20, size: 1, signed: false, scale: 1.0, field: Field::MoistureWarn },
    FieldSpec { id: 0x21, size: 1, signed: false, scale: 1.0, field: Field::Motion },
    FieldSpec { id: 0x2d, size: 1, signed: false, scale: 1.0, field: Field::Window },
];

/// A set of scaled measurements decoded from a single advertisement.
///
/// Keys are unique; inserting a field which is already present replaces the
/// earlier value. Iteration follows payload order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reading {
    entries: Vec<(Field, f64)>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(f, _)| *f == field) {
            entry.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| *value)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.entries.iter().any(|(f, _)| *f == field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Classifies the reading into a publication topic suffix.
    ///
    /// A reading with a single field is published under that field's own name.
    /// Multi-field readings are grouped: environmental measurements under
    /// "sensor", battery-bearing readings under "telemetry", anything else
    /// under "status". An empty reading has no topic and must not be
    /// published.
    pub fn topic_suffix(&self) -> Option<&'static str> {
        match self.entries.as_slice() {
            [] => None,
            [(field, _)] => Some(field.name()),
            _ if self.contains(Field::Temperature)
                || self.contains(Field::Humidity)
                || self.contains(Field::Pressure) =>
            {
                Some("sensor")
            }
            _ if self.contains(Field::Battery) => Some("telemetry"),
            _ => Some("status"),
        }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, (field, value)) in self.entries.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {value}")?;
        }
        Ok(())
    }
}

fn decode_value(bytes: &[u8], signed: bool) -> Option<i64> {
    Some(match (signed, bytes.len()) {
        (false, 1) => bytes[0].into(),
        (false, 2) => u16::from_le_bytes(bytes.try_into().unwrap()).into(),
        (false, 3) => {
            i64::from(bytes[0]) | i64::from(bytes[1]) << 8 | i64::from(bytes[2]) << 16
        }
        (false, 4) => u32::from_le_bytes(bytes.try_into().unwrap()).into(),
        (true, 1) => (bytes[0] as i8).into(),
        (true, 2) => i16::from_le_bytes(bytes.try_into().unwrap()).into(),
        (true, 3) => {
            let value =
                i32::from(bytes[0]) | i32::from(bytes[1]) << 8 | i32::from(bytes[2]) << 16;
            // Sign bit is bit 23 for a 3-byte value.
            if value & 0x80_0000 != 0 {
                i64::from(value - 0x100_0000)
            } else {
                value.into()
            }
        }
        (true, 4) => i32::from_le_bytes(bytes.try_into().unwrap()).into(),
        _ => return None,
    })
}

/// Decodes a type-value payload against the default [`FIELD_TABLE`].
pub fn decode(payload: &[u8]) -> Result<Reading, DecodeError> {
    decode_with_table(payload, FIELD_TABLE)
}

/// Decodes a type-value payload against the given field table.
///
/// Each element is an identifier byte followed by a little-endian integer
/// whose size, signedness and scale factor come from the table. An
/// unrecognised identifier ends the decode: without a length byte in the
/// format there is no way to know how far to skip, so the fields decoded so
/// far are returned. A value which would run past the end of the payload is
/// an error for the whole record.
pub fn decode_with_table(payload: &[u8], table: &[FieldSpec]) -> Result<Reading, DecodeError> {
    let mut reading = Reading::new();
    let mut offset = 0;

    while offset < payload.len() {
        let id = payload[offset];
        offset += 1;
        let Some(spec) = table.iter().find(|spec| spec.id == id) else {
            log::debug!("Unknown field identifier {id:#04x}, ignoring rest of payload");
            break;
        };
        let end = offset + usize::from(spec.size);
        let Some(bytes) = payload.get(offset..end) else {
            return Err(DecodeError::PrematureEnd { field: spec.field });
        };
        let raw = decode_value(bytes, spec.signed)
            .ok_or(DecodeError::UnsupportedSize(spec.size))?;
        reading.insert(spec.field, raw as f64 * spec.scale);
        offset = end;
    }

    Ok(reading)
}
