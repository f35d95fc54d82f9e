//! # IEEE C37.118 Common Types and Utilities
//!
//! This module defines the types shared by every IEEE C37.118 frame the concentrator
//! reads or writes: parse errors, the protocol version carried in the SYNC word, frame
//! type identification and the 14 byte common frame prefix.
//!
//! ## Key Components
//!
//! - `ParseError`: Enumerates errors encountered while decoding a frame image, such as
//!   invalid length, checksum or version.
//! - `Version`: Tracks the IEEE C37.118 revision (2005, 2011, 2024) from the SYNC field.
//! - `FrameType`: Frame types encoded in bits 6-4 of the SYNC field.
//! - `PrefixFrame`: SYNC, FRAMESIZE, IDCODE, SOC and FRACSEC with its time quality byte.
//!
//! ## Usage
//!
//! Every frame codec in this crate starts by reading or writing a `PrefixFrame` and
//! reports failures through `ParseError`. The concentrator wraps these errors into its
//! own error type before surfacing them as process exceptions.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags::TimeQualityFlags;

/// Size in bytes of the common frame prefix.
pub const PREFIX_SIZE: usize = 14;

/// Largest payload that fits in a frame after the prefix and checksum.
pub const MAXIMUM_DATA_LENGTH: usize = u16::MAX as usize - PREFIX_SIZE - 2;

/// Represents errors that can occur during IEEE C37.118 frame parsing.
///
/// # Variants
///
/// * `InvalidLength`: Frame length is too short or disagrees with FRAMESIZE.
/// * `InvalidFrameType`: Frame type in the SYNC field is invalid or unexpected.
/// * `InvalidChecksum`: CRC checksum does not match the calculated value.
/// * `InvalidFormat`: A field holds a value the standard does not allow.
/// * `InvalidHeader`: Header frame content is malformed.
/// * `VersionNotSupported`: Version in the SYNC field is not supported.
/// * `UnknownVersion`: Version in the SYNC field is unrecognized.
/// * `InvalidPhasorType`: Phasor data type is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid length: {message}")]
    InvalidLength { message: String },
    #[error("Invalid frame type: {message}")]
    InvalidFrameType { message: String },
    #[error("Invalid checksum: {message}")]
    InvalidChecksum { message: String },
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },
    #[error("Version not supported: {message}")]
    VersionNotSupported { message: String },
    #[error("Unknown version: {message}")]
    UnknownVersion { message: String },
    #[error("Invalid phasor type: {message}")]
    InvalidPhasorType { message: String },
}

/// Tracks the IEEE C37.118 standard version based on the SYNC field.
///
/// # Variants
///
/// * `V2005`: IEEE C37.118-2005 (SYNC version 0x1).
/// * `V2011`: IEEE C37.118.2-2011 (SYNC version 0x2).
/// * `V2024`: IEEE C37.118.2-2024 (SYNC version 0x3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Version {
    #[default]
    V2005,
    V2011,
    V2024,
}

impl Version {
    /// Creates a `Version` from the SYNC field's version bits (3-0).
    ///
    /// # Returns
    ///
    /// * `Ok(Version)`: The corresponding version.
    /// * `Err(ParseError::UnknownVersion)`: If the version bits are unrecognized.
    pub fn from_sync(sync: u16) -> Result<Self, ParseError> {
        match sync & 0x000F {
            0x0001 => Ok(Version::V2005),
            0x0002 => Ok(Version::V2011),
            0x0003 => Ok(Version::V2024),
            _ => Err(ParseError::UnknownVersion {
                message: format!("Unsupported version: 0x{:04X}", sync),
            }),
        }
    }

    /// Creates a `Version` from a string identifier.
    ///
    /// Accepts the standard's title, the short `v1`/`version1` forms and the
    /// `Std2005`/`Std2011` revision names used in concentrator settings.
    pub fn from_string(s: &str) -> Result<Self, ParseError> {
        match s.trim() {
            "IEEE Std C37.118-2005" | "version1" | "v1" | "2005" | "Std2005" => Ok(Version::V2005),
            "IEEE Std C37.118.2-2011" | "version2" | "v2" | "2011" | "Std2011" => {
                Ok(Version::V2011)
            }
            "IEEE Std C37.118.2-2024" | "version3" | "v3" | "2024" | "Std2024" => {
                Ok(Version::V2024)
            }
            other => Err(ParseError::UnknownVersion {
                message: format!(
                    "\"{}\" - use one of: Std2005, Std2011, Std2024, v1, v2, v3",
                    other
                ),
            }),
        }
    }

    /// Version number written to bits 3-0 of the SYNC field.
    pub fn sync_bits(&self) -> u16 {
        match self {
            Version::V2005 => 0x01,
            Version::V2011 => 0x02,
            Version::V2024 => 0x03,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V2005 => write!(f, "IEEE Std C37.118-2005"),
            Version::V2011 => write!(f, "IEEE Std C37.118.2-2011"),
            Version::V2024 => write!(f, "IEEE Std C37.118.2-2024"),
        }
    }
}

/// Constructs a SYNC field for an IEEE C37.118 frame.
///
/// Combines the leading byte (0xAA), frame type bits (6-4) and version bits (3-0).
pub fn create_sync(version: Version, frame_type: FrameType) -> u16 {
    (0xAAu16 << 8) | (frame_type.sync_bits() << 4) | version.sync_bits()
}

/// Represents the type of an IEEE C37.118 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Data,
    Header,
    Config1,
    Config2,
    Config3,
    Command,
}

impl FrameType {
    /// Extracts the frame type from the SYNC field.
    ///
    /// # Returns
    ///
    /// * `Ok(FrameType)`: The corresponding frame type.
    /// * `Err(ParseError::InvalidFrameType)`: If the leading byte is not 0xAA or the
    ///   frame type bits are undefined.
    pub fn from_sync(sync: u16) -> Result<FrameType, ParseError> {
        if (sync >> 8) != 0xAA {
            return Err(ParseError::InvalidFrameType {
                message: format!("Invalid first byte: 0x{:02X}, expected 0xAA", sync >> 8),
            });
        }
        let frame_type_bits = (sync >> 4) & 0x7;

        match frame_type_bits {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Header),
            2 => Ok(FrameType::Config1),
            3 => Ok(FrameType::Config2),
            4 => Ok(FrameType::Command),
            5 => Ok(FrameType::Config3),
            _ => Err(ParseError::InvalidFrameType {
                message: format!("Invalid frame type bits: {}", frame_type_bits),
            }),
        }
    }

    fn sync_bits(&self) -> u16 {
        match self {
            FrameType::Data => 0,
            FrameType::Header => 1,
            FrameType::Config1 => 2,
            FrameType::Config2 => 3,
            FrameType::Command => 4,
            FrameType::Config3 => 5,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Data => write!(f, "IEEE Std C37.118 Data Frame"),
            FrameType::Header => write!(f, "IEEE Std C37.118 Header Frame"),
            FrameType::Config1 => write!(f, "IEEE Std C37.118 Configuration Frame 1"),
            FrameType::Config2 => write!(f, "IEEE Std C37.118 Configuration Frame 2"),
            FrameType::Config3 => write!(f, "IEEE Std C37.118 Configuration Frame 3"),
            FrameType::Command => write!(f, "IEEE Std C37.118 Command Frame"),
        }
    }
}

/// Represents the common prefix structure for IEEE C37.118 frames.
///
/// # Fields
///
/// * `sync`: 16-bit SYNC field (frame type and version).
/// * `framesize`: Total frame length in bytes, checksum included.
/// * `idcode`: Device or stream identification code.
/// * `soc`: Second-of-century timestamp (Unix epoch).
/// * `time_quality`: Upper byte of FRACSEC (leap second and time quality flags).
/// * `fracsec`: 24-bit fraction of second, in time base counts.
/// * `version`: Derived IEEE C37.118 version (not serialized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixFrame {
    pub sync: u16,
    pub framesize: u16,
    pub idcode: u16,
    pub soc: u32,
    pub time_quality: u8,
    pub fracsec: u32,
    #[serde(skip)]
    pub version: Version,
}

impl PrefixFrame {
    /// Creates a prefix for the given frame type with a zero timestamp.
    ///
    /// `framesize` starts at the prefix size and is filled in by the frame encoder.
    pub fn new(frame_type: FrameType, idcode: u16, version: Version) -> Self {
        PrefixFrame {
            sync: create_sync(version, frame_type),
            framesize: PREFIX_SIZE as u16,
            idcode,
            soc: 0,
            time_quality: 0,
            fracsec: 0,
            version,
        }
    }

    /// Parses a `PrefixFrame` from a byte slice.
    ///
    /// # Returns
    ///
    /// * `Ok(PrefixFrame)`: The parsed prefix frame.
    /// * `Err(ParseError)`: If fewer than 14 bytes are available or the SYNC word carries
    ///   an unknown version.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Too few bytes to parse PrefixFrame: Expected at least {} bytes, but got {}",
                    PREFIX_SIZE,
                    bytes.len()
                ),
            });
        }
        let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        FrameType::from_sync(sync)?;
        let version = Version::from_sync(sync)?;

        Ok(PrefixFrame {
            sync,
            framesize: u16::from_be_bytes([bytes[2], bytes[3]]),
            idcode: u16::from_be_bytes([bytes[4], bytes[5]]),
            soc: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            time_quality: bytes[10],
            fracsec: u32::from_be_bytes([0, bytes[11], bytes[12], bytes[13]]),
            version,
        })
    }

    /// Converts the `PrefixFrame` to its 14-byte wire image.
    pub fn to_hex(&self) -> [u8; PREFIX_SIZE] {
        let mut result = [0u8; PREFIX_SIZE];
        result[0..2].copy_from_slice(&self.sync.to_be_bytes());
        result[2..4].copy_from_slice(&self.framesize.to_be_bytes());
        result[4..6].copy_from_slice(&self.idcode.to_be_bytes());
        result[6..10].copy_from_slice(&self.soc.to_be_bytes());
        result[10] = self.time_quality;

        let fracsec = self.fracsec.to_be_bytes();
        result[11..14].copy_from_slice(&fracsec[1..4]);
        result
    }

    /// The frame type encoded in the SYNC word.
    pub fn frame_type(&self) -> Result<FrameType, ParseError> {
        FrameType::from_sync(self.sync)
    }

    /// Time quality byte widened to its position in the 32-bit FRACSEC word.
    pub fn time_quality_flags(&self) -> TimeQualityFlags {
        TimeQualityFlags::from_raw((self.time_quality as u32) << 24)
    }

    pub fn set_time_quality_flags(&mut self, flags: TimeQualityFlags) {
        self.time_quality = (flags.raw() >> 24) as u8;
    }
}

/// Checks that a buffer holds exactly one frame of the expected kind.
///
/// Verifies the prefix, that FRAMESIZE matches the buffer length and that the frame
/// type is one of `expected`.
pub(crate) fn expect_frame(
    bytes: &[u8],
    expected: &[FrameType],
    context: &str,
) -> Result<(PrefixFrame, FrameType), ParseError> {
    if bytes.len() < PREFIX_SIZE + 2 {
        return Err(ParseError::InvalidLength {
            message: format!(
                "{}: {} bytes cannot hold a prefix and checksum",
                context,
                bytes.len()
            ),
        });
    }
    let prefix = PrefixFrame::from_hex(bytes)?;
    let frame_type = prefix.frame_type()?;
    if !expected.contains(&frame_type) {
        return Err(ParseError::InvalidFrameType {
            message: format!("{}: unexpected {}", context, frame_type),
        });
    }
    if prefix.framesize as usize != bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "{}: FRAMESIZE is {} bytes but the buffer holds {}",
                context,
                prefix.framesize,
                bytes.len()
            ),
        });
    }
    Ok((prefix, frame_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sync() {
        let sync = create_sync(Version::V2005, FrameType::Config1);
        assert_eq!(sync.to_be_bytes(), [0xAA, 0x21], "Failed for V2005 Config1");

        let versions = [Version::V2005, Version::V2011, Version::V2024];
        let frame_types = [
            FrameType::Data,
            FrameType::Header,
            FrameType::Config1,
            FrameType::Config2,
            FrameType::Config3,
            FrameType::Command,
        ];

        for &version in &versions {
            for &frame_type in &frame_types {
                let sync = create_sync(version, frame_type);
                assert_eq!(sync >> 8, 0xAA);
                assert_eq!(Version::from_sync(sync).unwrap(), version);
                assert_eq!(
                    FrameType::from_sync(sync).unwrap(),
                    frame_type,
                    "Round-trip frame type mismatch for {:?} {:?}",
                    version,
                    frame_type
                );
            }
        }
    }

    #[test]
    fn test_frame_type_rejects_bad_leading_byte() {
        let err = FrameType::from_sync(0xAB01).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFrameType { .. }));
        assert!(FrameType::from_sync(0xAA71).is_err());
    }

    #[test]
    fn test_prefix_keeps_time_quality_byte() {
        let mut prefix = PrefixFrame::new(FrameType::Data, 7734, Version::V2005);
        prefix.soc = 1_149_580_800;
        prefix.fracsec = 0x00ABCDEF;
        prefix.time_quality = 0x0F;

        let image = prefix.to_hex();
        assert_eq!(image[10], 0x0F);
        assert_eq!(&image[11..14], &[0xAB, 0xCD, 0xEF]);

        let parsed = PrefixFrame::from_hex(&image).unwrap();
        assert_eq!(parsed, prefix);
        assert_eq!(parsed.time_quality_flags().raw(), 0x0F00_0000);
    }

    #[test]
    fn test_version_from_settings_names() {
        assert_eq!(Version::from_string("Std2011").unwrap(), Version::V2011);
        assert_eq!(Version::from_string(" v1 ").unwrap(), Version::V2005);
        assert!(Version::from_string("Draft6").is_err());
    }
}
