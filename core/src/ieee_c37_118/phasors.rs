//! # IEEE C37.118 Phasor Encoding
//!
//! Phasors travel as four possible encodings, selected by the FORMAT word of their
//! configuration cell: 32-bit float or 16-bit integer, polar or rectangular. Integer
//! encodings are scaled by the PHUNIT conversion factor.
//!
//! ## Key Components
//!
//! - `PhasorFormat`: The four wire encodings.
//! - `Phasor`: Engineering value of a phasor (magnitude and angle in radians).
//! - `PhasorValue`: Raw wire value in one of the four encodings.
//! - `PhasorFloatPolar`, `PhasorFloatRect`, `PhasorIntPolar`, `PhasorIntRect`:
//!   The per-encoding wire structs.
//!
//! ## Usage
//!
//! The data frame encoder turns each `Phasor` into a `PhasorValue` with `Phasor::encode`
//! and the decoder goes the other way with `PhasorValue::to_phasor`.

use super::common::ParseError;
use super::flags::{CoordinateFormat, DataFormat, FormatFlags};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer phasor angles are radians × 10⁴.
const INT_ANGLE_SCALE: f64 = 10_000.0;

fn expect_len(bytes: &[u8], len: usize, what: &str) -> Result<(), ParseError> {
    if bytes.len() < len {
        return Err(ParseError::InvalidLength {
            message: format!(
                "Invalid length for {}: expected {} bytes, got {}",
                what,
                len,
                bytes.len()
            ),
        });
    }
    Ok(())
}

fn to_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Enumerates phasor wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhasorFormat {
    #[default]
    FloatPolar,
    FloatRect,
    IntPolar,
    IntRect,
}

impl fmt::Display for PhasorFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhasorFormat::FloatPolar => write!(f, "FloatPolar"),
            PhasorFormat::FloatRect => write!(f, "FloatRect"),
            PhasorFormat::IntPolar => write!(f, "IntPolar"),
            PhasorFormat::IntRect => write!(f, "IntRect"),
        }
    }
}

impl PhasorFormat {
    pub fn from_format_flags(format: FormatFlags) -> Self {
        match (format.phasor_format(), format.coordinate_format()) {
            (DataFormat::FloatingPoint, CoordinateFormat::Polar) => PhasorFormat::FloatPolar,
            (DataFormat::FloatingPoint, CoordinateFormat::Rectangular) => PhasorFormat::FloatRect,
            (DataFormat::FixedInteger, CoordinateFormat::Polar) => PhasorFormat::IntPolar,
            (DataFormat::FixedInteger, CoordinateFormat::Rectangular) => PhasorFormat::IntRect,
        }
    }

    /// Creates a `PhasorFormat` from its display name.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidPhasorType)`: If the name is not one of the four formats.
    pub fn from_name(s: &str) -> Result<Self, ParseError> {
        match s {
            "FloatPolar" => Ok(PhasorFormat::FloatPolar),
            "FloatRect" => Ok(PhasorFormat::FloatRect),
            "IntPolar" => Ok(PhasorFormat::IntPolar),
            "IntRect" => Ok(PhasorFormat::IntRect),
            _ => Err(ParseError::InvalidPhasorType {
                message: format!("Invalid phasor type: {}", s),
            }),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            PhasorFormat::FloatPolar | PhasorFormat::FloatRect => 8,
            PhasorFormat::IntPolar | PhasorFormat::IntRect => 4,
        }
    }
}

/// Engineering value of a phasor.
///
/// # Fields
///
/// * `magnitude`: Volts or amperes.
/// * `angle`: Radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Phasor {
    pub magnitude: f64,
    pub angle: f64,
}

impl Phasor {
    pub fn new(magnitude: f64, angle: f64) -> Self {
        Phasor { magnitude, angle }
    }

    pub fn from_rectangular(real: f64, imag: f64) -> Self {
        Phasor {
            magnitude: (real * real + imag * imag).sqrt(),
            angle: imag.atan2(real),
        }
    }

    pub fn real(&self) -> f64 {
        self.magnitude * self.angle.cos()
    }

    pub fn imag(&self) -> f64 {
        self.magnitude * self.angle.sin()
    }

    /// Encodes the phasor for the wire.
    ///
    /// # Parameters
    ///
    /// * `format`: Target wire encoding.
    /// * `factor`: Engineering units per integer count (PHUNIT × 10⁻⁵). Only used by the
    ///   integer encodings; a zero factor encodes zero.
    /// * `offset`: Subtracted from the magnitude (polar) or each component (rectangular)
    ///   before integer scaling.
    pub fn encode(&self, format: PhasorFormat, factor: f64, offset: f64) -> PhasorValue {
        let scale = |value: f64| {
            if factor == 0.0 {
                0.0
            } else {
                (value - offset) / factor
            }
        };
        match format {
            PhasorFormat::FloatPolar => PhasorValue::FloatPolar(PhasorFloatPolar {
                magnitude: self.magnitude as f32,
                angle: self.angle as f32,
            }),
            PhasorFormat::FloatRect => PhasorValue::FloatRect(PhasorFloatRect {
                real: self.real() as f32,
                imag: self.imag() as f32,
            }),
            PhasorFormat::IntPolar => PhasorValue::IntPolar(PhasorIntPolar {
                magnitude: to_u16(scale(self.magnitude)),
                angle: to_i16(self.angle * INT_ANGLE_SCALE),
            }),
            PhasorFormat::IntRect => PhasorValue::IntRect(PhasorIntRect {
                real: to_i16(scale(self.real())),
                imag: to_i16(scale(self.imag())),
            }),
        }
    }
}

/// A phasor in one of the four wire encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhasorValue {
    FloatPolar(PhasorFloatPolar),
    FloatRect(PhasorFloatRect),
    IntPolar(PhasorIntPolar),
    IntRect(PhasorIntRect),
}

impl PhasorValue {
    /// Parses a phasor value of the given encoding from the front of `bytes`.
    pub fn from_hex(bytes: &[u8], format: PhasorFormat) -> Result<Self, ParseError> {
        match format {
            PhasorFormat::FloatPolar => Ok(PhasorValue::FloatPolar(PhasorFloatPolar::from_hex(
                bytes,
            )?)),
            PhasorFormat::FloatRect => {
                Ok(PhasorValue::FloatRect(PhasorFloatRect::from_hex(bytes)?))
            }
            PhasorFormat::IntPolar => Ok(PhasorValue::IntPolar(PhasorIntPolar::from_hex(bytes)?)),
            PhasorFormat::IntRect => Ok(PhasorValue::IntRect(PhasorIntRect::from_hex(bytes)?)),
        }
    }

    /// Appends the wire image to `buffer`.
    pub fn write_to(&self, buffer: &mut Vec<u8>) {
        match self {
            PhasorValue::FloatPolar(p) => buffer.extend_from_slice(&p.to_hex()),
            PhasorValue::FloatRect(p) => buffer.extend_from_slice(&p.to_hex()),
            PhasorValue::IntPolar(p) => buffer.extend_from_slice(&p.to_hex()),
            PhasorValue::IntRect(p) => buffer.extend_from_slice(&p.to_hex()),
        }
    }

    pub fn format(&self) -> PhasorFormat {
        match self {
            PhasorValue::FloatPolar(_) => PhasorFormat::FloatPolar,
            PhasorValue::FloatRect(_) => PhasorFormat::FloatRect,
            PhasorValue::IntPolar(_) => PhasorFormat::IntPolar,
            PhasorValue::IntRect(_) => PhasorFormat::IntRect,
        }
    }

    /// Converts the wire value back to engineering units.
    ///
    /// `factor` and `offset` have the same meaning as in `Phasor::encode`.
    pub fn to_phasor(&self, factor: f64, offset: f64) -> Phasor {
        match self {
            PhasorValue::FloatPolar(p) => Phasor::new(p.magnitude as f64, p.angle as f64),
            PhasorValue::FloatRect(p) => Phasor::from_rectangular(p.real as f64, p.imag as f64),
            PhasorValue::IntPolar(p) => Phasor::new(
                p.magnitude as f64 * factor + offset,
                p.angle as f64 / INT_ANGLE_SCALE,
            ),
            PhasorValue::IntRect(p) => Phasor::from_rectangular(
                p.real as f64 * factor + offset,
                p.imag as f64 * factor + offset,
            ),
        }
    }
}

/// Floating-point polar phasor (magnitude, angle in radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasorFloatPolar {
    pub magnitude: f32,
    pub angle: f32,
}

impl PhasorFloatPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_len(bytes, 8, "PhasorFloatPolar")?;
        Ok(PhasorFloatPolar {
            magnitude: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            angle: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.magnitude.to_be_bytes());
        result[4..8].copy_from_slice(&self.angle.to_be_bytes());
        result
    }
}

/// Floating-point rectangular phasor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasorFloatRect {
    pub real: f32,
    pub imag: f32,
}

impl PhasorFloatRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_len(bytes, 8, "PhasorFloatRect")?;
        Ok(PhasorFloatRect {
            real: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            imag: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.real.to_be_bytes());
        result[4..8].copy_from_slice(&self.imag.to_be_bytes());
        result
    }
}

/// Integer polar phasor: unsigned magnitude in PHUNIT counts, angle in radians × 10⁴.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasorIntPolar {
    pub magnitude: u16,
    pub angle: i16,
}

impl PhasorIntPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_len(bytes, 4, "PhasorIntPolar")?;
        Ok(PhasorIntPolar {
            magnitude: u16::from_be_bytes([bytes[0], bytes[1]]),
            angle: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.magnitude.to_be_bytes());
        result[2..4].copy_from_slice(&self.angle.to_be_bytes());
        result
    }
}

/// Integer rectangular phasor in PHUNIT counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasorIntRect {
    pub real: i16,
    pub imag: i16,
}

impl PhasorIntRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        expect_len(bytes, 4, "PhasorIntRect")?;
        Ok(PhasorIntRect {
            real: i16::from_be_bytes([bytes[0], bytes[1]]),
            imag: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.real.to_be_bytes());
        result[2..4].copy_from_slice(&self.imag.to_be_bytes());
        result
    }
}
