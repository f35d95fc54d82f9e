//! # IEEE C37.118 Command Frames
//!
//! Command frames let a client control a data stream: turn real-time data on or off and
//! request header or configuration frames. Codes outside the standard set are kept as
//! reserved or user-defined values so the receiver can report them.
//!
//! ## Key Components
//!
//! - `DeviceCommand`: The 16-bit CMD word.
//! - `CommandFrame`: Prefix, command and optional extended data.

use bytes::BufMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{expect_frame, FrameType, ParseError, PrefixFrame, Version, PREFIX_SIZE};
use super::utils::{seal_frame, to_soc_fracsec, validate_checksum};

/// Largest extended data block: a full frame minus prefix, CMD and checksum.
pub const MAXIMUM_EXTENDED_DATA_LENGTH: usize = u16::MAX as usize - PREFIX_SIZE - 2 - 2;

/// Resolution used for the FRACSEC of frames this crate sends as a client.
pub const COMMAND_TIME_BASE: u32 = 1_000_000;

/// The CMD word of a command frame.
///
/// # Variants
///
/// * `DisableRealTimeData` (1), `EnableRealTimeData` (2), `SendHeaderFrame` (3),
///   `SendConfigurationFrame1` (4), `SendConfigurationFrame2` (5),
///   `SendConfigurationFrame3` (6), `ExtendedFrame` (8).
/// * `UserDefined`: Codes 256-4095, reserved by the standard for users.
/// * `Reserved`: Every other code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCommand {
    DisableRealTimeData,
    EnableRealTimeData,
    SendHeaderFrame,
    SendConfigurationFrame1,
    SendConfigurationFrame2,
    SendConfigurationFrame3,
    ExtendedFrame,
    UserDefined(u16),
    Reserved(u16),
}

impl DeviceCommand {
    pub fn code(&self) -> u16 {
        match self {
            DeviceCommand::DisableRealTimeData => 1,
            DeviceCommand::EnableRealTimeData => 2,
            DeviceCommand::SendHeaderFrame => 3,
            DeviceCommand::SendConfigurationFrame1 => 4,
            DeviceCommand::SendConfigurationFrame2 => 5,
            DeviceCommand::SendConfigurationFrame3 => 6,
            DeviceCommand::ExtendedFrame => 8,
            DeviceCommand::UserDefined(code) | DeviceCommand::Reserved(code) => *code,
        }
    }
}

impl From<u16> for DeviceCommand {
    fn from(code: u16) -> Self {
        match code {
            1 => DeviceCommand::DisableRealTimeData,
            2 => DeviceCommand::EnableRealTimeData,
            3 => DeviceCommand::SendHeaderFrame,
            4 => DeviceCommand::SendConfigurationFrame1,
            5 => DeviceCommand::SendConfigurationFrame2,
            6 => DeviceCommand::SendConfigurationFrame3,
            8 => DeviceCommand::ExtendedFrame,
            0x0100..=0x0FFF => DeviceCommand::UserDefined(code),
            _ => DeviceCommand::Reserved(code),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::DisableRealTimeData => write!(f, "DisableRealTimeData"),
            DeviceCommand::EnableRealTimeData => write!(f, "EnableRealTimeData"),
            DeviceCommand::SendHeaderFrame => write!(f, "SendHeaderFrame"),
            DeviceCommand::SendConfigurationFrame1 => write!(f, "SendConfigurationFrame1"),
            DeviceCommand::SendConfigurationFrame2 => write!(f, "SendConfigurationFrame2"),
            DeviceCommand::SendConfigurationFrame3 => write!(f, "SendConfigurationFrame3"),
            DeviceCommand::ExtendedFrame => write!(f, "ExtendedFrame"),
            DeviceCommand::UserDefined(code) => write!(f, "UserDefined(0x{:04X})", code),
            DeviceCommand::Reserved(code) => write!(f, "Reserved(0x{:04X})", code),
        }
    }
}

/// An IEEE C37.118 command frame.
///
/// # Fields
///
/// * `id_code`: Target stream ID code.
/// * `version`: Protocol revision from SYNC.
/// * `soc`, `fracsec`: Send time as carried on the wire.
/// * `command`: The requested action.
/// * `extended_data`: Payload following CMD, empty for ordinary commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub id_code: u16,
    pub version: Version,
    pub soc: u32,
    pub fracsec: u32,
    pub command: DeviceCommand,
    pub extended_data: Vec<u8>,
}

impl CommandFrame {
    /// Creates a command stamped with `timestamp`.
    pub fn new(id_code: u16, command: DeviceCommand, timestamp: DateTime<Utc>) -> Self {
        let (soc, fracsec) = to_soc_fracsec(timestamp, COMMAND_TIME_BASE);
        CommandFrame {
            id_code,
            version: Version::V2005,
            soc,
            fracsec,
            command,
            extended_data: Vec::new(),
        }
    }

    /// Attaches an extended data block.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidLength)`: If `data` exceeds the room left in a frame.
    pub fn with_extended_data(mut self, data: Vec<u8>) -> Result<Self, ParseError> {
        if data.len() > MAXIMUM_EXTENDED_DATA_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Extended data of {} bytes exceeds the {} byte limit",
                    data.len(),
                    MAXIMUM_EXTENDED_DATA_LENGTH
                ),
            });
        }
        self.extended_data = data;
        Ok(self)
    }

    /// Parses a command frame.
    ///
    /// # Returns
    ///
    /// * `Ok(CommandFrame)`: The parsed frame.
    /// * `Err(ParseError)`: If the image is shorter than 18 bytes, is not a command
    ///   frame, disagrees with FRAMESIZE or fails its checksum.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < PREFIX_SIZE + 4 {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "CommandFrame: Expected at least {} bytes, but got {}",
                    PREFIX_SIZE + 4,
                    bytes.len()
                ),
            });
        }
        let (prefix, _) = expect_frame(bytes, &[FrameType::Command], "CommandFrame")?;
        validate_checksum(bytes)?;

        let command = DeviceCommand::from(u16::from_be_bytes([bytes[14], bytes[15]]));
        Ok(CommandFrame {
            id_code: prefix.idcode,
            version: prefix.version,
            soc: prefix.soc,
            fracsec: prefix.fracsec,
            command,
            extended_data: bytes[16..bytes.len() - 2].to_vec(),
        })
    }

    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::with_capacity(PREFIX_SIZE + 4 + self.extended_data.len());
        let mut prefix = PrefixFrame::new(FrameType::Command, self.id_code, self.version);
        prefix.soc = self.soc;
        prefix.fracsec = self.fracsec;
        out.put_slice(&prefix.to_hex());
        out.put_u16(self.command.code());
        out.put_slice(&self.extended_data);
        seal_frame(&mut out)?;
        Ok(out)
    }
}
