//! # IEEE C37.118 Measurement Units
//!
//! Conversion factor words carried by configuration frames (PHUNIT, ANUNIT, DIGUNIT),
//! the nominal frequency word (FNOM) and the reporting rate (DATA_RATE).
//!
//! ## Key Components
//!
//! - `PhasorUnits`: Voltage/current flag plus a 24-bit scale in 10⁻⁵ V or A per bit.
//! - `AnalogUnits`: Analog measurement kind plus a signed 24-bit user scale.
//! - `DigitalUnits`: Normal status and valid inputs masks for one digital word.
//! - `NominalFrequency`: 50 Hz or 60 Hz.
//! - `DataRate`: Frames per second, or seconds per frame when negative.

use super::common::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale applied to PHUNIT and ANUNIT conversion factors.
pub const SCALE_FACTOR_UNIT: f64 = 0.00001;

fn expect_four_bytes(bytes: &[u8], what: &str) -> Result<(), ParseError> {
    if bytes.len() < 4 {
        return Err(ParseError::InvalidLength {
            message: format!(
                "Invalid length for {}: expected 4 bytes, got {}",
                what,
                bytes.len()
            ),
        });
    }
    Ok(())
}

/// Whether a phasor measures voltage or current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhasorType {
    #[default]
    Voltage,
    Current,
}

impl fmt::Display for PhasorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhasorType::Voltage => write!(f, "Voltage"),
            PhasorType::Current => write!(f, "Current"),
        }
    }
}

/// Conversion factor for one phasor channel.
///
/// # Fields
///
/// * `phasor_type`: Voltage or current (most significant byte 0 or 1).
/// * `scale_factor`: Unsigned 24-bit scale in 10⁻⁵ V or A per bit. Ignored on the wire
///   when phasors are sent as floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorUnits {
    pub phasor_type: PhasorType,
    pub scale_factor: u32,
}

impl PhasorUnits {
    /// Parses phasor units from the first 4 bytes of `bytes`.
    ///
    /// # Returns
    ///
    /// * `Ok(PhasorUnits)`: The parsed phasor units.
    /// * `Err(ParseError::InvalidLength)`: If fewer than 4 bytes are available.
    /// * `Err(ParseError::InvalidFormat)`: If the type byte is neither 0 nor 1.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_four_bytes(bytes, "PhasorUnits")?;
        let phasor_type = match bytes[0] {
            0 => PhasorType::Voltage,
            1 => PhasorType::Current,
            other => {
                return Err(ParseError::InvalidFormat {
                    message: format!("Invalid PHUNIT type byte: {}", other),
                })
            }
        };
        Ok(PhasorUnits {
            phasor_type,
            scale_factor: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
        })
    }

    /// Converts the phasor units to their 4-byte wire image.
    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = self.scale_factor.to_be_bytes();
        bytes[0] = match self.phasor_type {
            PhasorType::Voltage => 0,
            PhasorType::Current => 1,
        };
        bytes
    }

    /// Engineering units per integer count.
    pub fn conversion_factor(&self) -> f64 {
        self.scale_factor as f64 * SCALE_FACTOR_UNIT
    }
}

/// Kind of analog measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalogType {
    #[default]
    SinglePointOnWave,
    RmsOfAnalogInput,
    PeakOfAnalogInput,
    Reserved(u8),
}

impl fmt::Display for AnalogType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogType::SinglePointOnWave => write!(f, "Single Point-On-Wave"),
            AnalogType::RmsOfAnalogInput => write!(f, "RMS"),
            AnalogType::PeakOfAnalogInput => write!(f, "Peak"),
            AnalogType::Reserved(code) => write!(f, "Reserved ({})", code),
        }
    }
}

impl AnalogType {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => AnalogType::SinglePointOnWave,
            1 => AnalogType::RmsOfAnalogInput,
            2 => AnalogType::PeakOfAnalogInput,
            code => AnalogType::Reserved(code),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            AnalogType::SinglePointOnWave => 0,
            AnalogType::RmsOfAnalogInput => 1,
            AnalogType::PeakOfAnalogInput => 2,
            AnalogType::Reserved(code) => code,
        }
    }
}

/// Conversion factor for one analog channel.
///
/// # Fields
///
/// * `analog_type`: Measurement kind (most significant byte).
/// * `scale_factor`: Signed 24-bit user defined scale, sign extended to 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogUnits {
    pub analog_type: AnalogType,
    pub scale_factor: i32,
}

impl AnalogUnits {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_four_bytes(bytes, "AnalogUnits")?;
        // shift back down to sign extend the 24-bit value
        let scale_factor = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], 0]) >> 8;
        Ok(AnalogUnits {
            analog_type: AnalogType::from_byte(bytes[0]),
            scale_factor,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = self.scale_factor.to_be_bytes();
        bytes[0] = self.analog_type.to_byte();
        bytes
    }

    pub fn conversion_factor(&self) -> f64 {
        self.scale_factor as f64 * SCALE_FACTOR_UNIT
    }
}

/// Mask words for one 16-bit digital status word.
///
/// `normal_status` XORed with the status word yields 0 in the normal state;
/// `valid_inputs` has a bit set for each input currently wired to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigitalUnits {
    pub normal_status: u16,
    pub valid_inputs: u16,
}

impl DigitalUnits {
    /// Splits a combined 32-bit mask: low word is the normal status, high word the
    /// valid inputs.
    pub fn from_mask(mask: u32) -> Self {
        DigitalUnits {
            normal_status: (mask & 0xFFFF) as u16,
            valid_inputs: (mask >> 16) as u16,
        }
    }

    pub fn mask(&self) -> u32 {
        ((self.valid_inputs as u32) << 16) | self.normal_status as u32
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_four_bytes(bytes, "DigitalUnits")?;
        Ok(DigitalUnits {
            normal_status: u16::from_be_bytes([bytes[0], bytes[1]]),
            valid_inputs: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        bytes[0..2].copy_from_slice(&self.normal_status.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.valid_inputs.to_be_bytes());
        bytes
    }
}

/// Nominal line frequency.
///
/// FNOM is a 16-bit word where only bit 0 is defined: set for 50 Hz, clear for 60 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    #[default]
    Hz60,
}

impl NominalFrequency {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 2 {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Invalid length for NominalFrequency: expected 2 bytes, got {}",
                    bytes.len()
                ),
            });
        }
        let fnom = u16::from_be_bytes([bytes[0], bytes[1]]);
        if fnom & 0x0001 != 0 {
            Ok(NominalFrequency::Hz50)
        } else {
            Ok(NominalFrequency::Hz60)
        }
    }

    pub fn to_hex(&self) -> [u8; 2] {
        match self {
            NominalFrequency::Hz50 => [0, 1],
            NominalFrequency::Hz60 => [0, 0],
        }
    }

    /// Maps a frequency in hertz to the matching variant.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidFormat)`: For anything other than 50 or 60.
    pub fn from_hz(hz: u32) -> Result<Self, ParseError> {
        match hz {
            50 => Ok(NominalFrequency::Hz50),
            60 => Ok(NominalFrequency::Hz60),
            other => Err(ParseError::InvalidFormat {
                message: format!("Nominal frequency must be 50 or 60 Hz, got {}", other),
            }),
        }
    }

    pub fn hz(&self) -> f64 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

/// Rate of phasor data transmission.
///
/// A positive value is frames per second, a negative value is seconds per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRate(pub i16);

impl DataRate {
    pub fn from_hex(bytes: [u8; 2]) -> Self {
        DataRate(i16::from_be_bytes(bytes))
    }

    pub fn to_hex(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Frames per second as a float.
    pub fn frequency(&self) -> f64 {
        match self.0 {
            0 => 0.0,
            rate if rate > 0 => rate as f64,
            rate => 1.0 / (-(rate as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phasor_units() {
        let voltage = PhasorUnits::from_hex(&[0x00, 0x0D, 0xF8, 0x47]).unwrap();
        let current = PhasorUnits::from_hex(&[0x01, 0x00, 0xB2, 0xD0]).unwrap();

        assert_eq!(voltage.phasor_type, PhasorType::Voltage);
        assert_eq!(current.phasor_type, PhasorType::Current);
        assert_eq!(voltage.scale_factor, 915527);
        assert_eq!(current.scale_factor, 45776);
        assert_eq!(current.to_hex(), [0x01, 0x00, 0xB2, 0xD0]);
        assert!((voltage.conversion_factor() - 9.15527).abs() < 1e-9);

        assert!(PhasorUnits::from_hex(&[0x02, 0, 0, 0]).is_err());
        assert!(PhasorUnits::from_hex(&[0x00, 0]).is_err());
    }

    #[test]
    fn test_analog_units_sign_extension() {
        let negative = AnalogUnits {
            analog_type: AnalogType::RmsOfAnalogInput,
            scale_factor: -2,
        };
        let image = negative.to_hex();
        assert_eq!(image, [0x01, 0xFF, 0xFF, 0xFE]);
        assert_eq!(AnalogUnits::from_hex(&image).unwrap(), negative);

        let reserved = AnalogUnits::from_hex(&[0x09, 0x14, 0xF4, 0x6B]).unwrap();
        assert_eq!(reserved.analog_type, AnalogType::Reserved(9));
        assert_eq!(reserved.scale_factor, 1373291);
    }

    #[test]
    fn test_digital_mask_split() {
        let units = DigitalUnits::from_mask(0xFFFF_0000);
        assert_eq!(units.normal_status, 0x0000);
        assert_eq!(units.valid_inputs, 0xFFFF);
        assert_eq!(units.to_hex(), [0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(units.mask(), 0xFFFF_0000);
    }

    #[test]
    fn test_nominal_frequency_uses_bit_zero() {
        assert_eq!(
            NominalFrequency::from_hex(&[0x00, 0x01]).unwrap(),
            NominalFrequency::Hz50
        );
        assert_eq!(
            NominalFrequency::from_hex(&[0x00, 0x00]).unwrap(),
            NominalFrequency::Hz60
        );
        assert_eq!(NominalFrequency::Hz50.to_hex(), [0x00, 0x01]);
        assert_eq!(NominalFrequency::Hz60.to_string(), "60 Hz");
        assert!(NominalFrequency::from_hz(55).is_err());
    }

    #[test]
    fn test_data_rate() {
        assert_eq!(DataRate(30).frequency(), 30.0);
        assert_eq!(DataRate(-5).frequency(), 0.2);
        assert_eq!(DataRate::from_hex([0xFF, 0xFB]), DataRate(-5));
    }
}
