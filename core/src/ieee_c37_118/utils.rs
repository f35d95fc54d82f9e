//! # IEEE C37.118 Frame Utilities
//!
//! CRC-CCITT checksums as specified in IEEE C37.118.2-2011 Appendix B, frame sealing and
//! conversions between `chrono` timestamps and the SOC/FRACSEC pair.

use super::common::{ParseError, PREFIX_SIZE};
use bytes::Buf;
use chrono::{DateTime, TimeZone, Utc};

/// Calculates the CRC-CCITT checksum for a given buffer.
///
/// Initial value 0xFFFF, polynomial 0x1021, no final XOR.
///
/// # Parameters
///
/// * `buffer`: The input byte slice to calculate the CRC for.
///
/// # Returns
///
/// The calculated 16-bit CRC checksum.
pub fn calculate_crc(buffer: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buffer {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Validates the checksum of a given buffer.
///
/// # Parameters
///
/// * `buffer`: The input byte slice, where the last two bytes are the expected CRC.
///
/// # Returns
///
/// * `Ok(())` if the checksum is valid.
/// * `Err(ParseError::InvalidLength)` if the buffer is too short.
/// * `Err(ParseError::InvalidChecksum)` if the checksum does not match.
pub fn validate_checksum(buffer: &[u8]) -> Result<(), ParseError> {
    if buffer.len() < 2 {
        return Err(ParseError::InvalidLength {
            message: format!("Buffer too short: {}", buffer.len()),
        });
    }

    let calculated_crc = calculate_crc(&buffer[..buffer.len() - 2]);
    let frame_crc = u16::from_be_bytes([buffer[buffer.len() - 2], buffer[buffer.len() - 1]]);

    if calculated_crc != frame_crc {
        return Err(ParseError::InvalidChecksum {
            message: format!(
                "CRC Checksum Mismatch: Expected {:04X}, got {:04X}",
                calculated_crc, frame_crc
            ),
        });
    }
    Ok(())
}

/// Writes FRAMESIZE into an encoded frame and appends its checksum.
///
/// `buffer` must start with a 14-byte prefix and hold the whole frame body.
///
/// # Returns
///
/// * `Err(ParseError::InvalidLength)`: If the sealed frame would not fit in FRAMESIZE.
pub fn seal_frame(buffer: &mut Vec<u8>) -> Result<(), ParseError> {
    let total = buffer.len() + 2;
    if buffer.len() < PREFIX_SIZE || total > u16::MAX as usize {
        return Err(ParseError::InvalidLength {
            message: format!("Cannot seal a frame of {} bytes", total),
        });
    }
    buffer[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    let crc = calculate_crc(buffer);
    buffer.extend_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// Splits a timestamp into second-of-century and a 24-bit fraction of second.
///
/// # Parameters
///
/// * `timestamp`: Instant to encode. Instants before the Unix epoch encode as 0.
/// * `time_base`: Fraction-of-second counts per second (24-bit).
///
/// # Returns
///
/// `(soc, fracsec)` where `fracsec` is the nearest count. A fraction that rounds up to
/// a full second is carried into `soc`.
pub fn to_soc_fracsec(timestamp: DateTime<Utc>, time_base: u32) -> (u32, u32) {
    let mut seconds = timestamp.timestamp();
    if seconds < 0 || time_base == 0 {
        return (seconds.clamp(0, u32::MAX as i64) as u32, 0);
    }
    let nanos = timestamp.timestamp_subsec_nanos().min(999_999_999) as u64;
    let time_base = (time_base & 0x00FF_FFFF) as u64;
    let mut fracsec = (nanos * time_base + 500_000_000) / 1_000_000_000;
    if fracsec >= time_base {
        seconds += 1;
        fracsec = 0;
    }
    (seconds.min(u32::MAX as i64) as u32, fracsec as u32)
}

/// Rebuilds a timestamp from SOC and FRACSEC.
///
/// # Returns
///
/// * `Err(ParseError::InvalidFormat)`: If `time_base` is zero or the fraction is not
///   below one second.
pub fn from_soc_fracsec(
    soc: u32,
    fracsec: u32,
    time_base: u32,
) -> Result<DateTime<Utc>, ParseError> {
    let fracsec = fracsec & 0x00FF_FFFF;
    if time_base == 0 || fracsec >= time_base {
        return Err(ParseError::InvalidFormat {
            message: format!(
                "FRACSEC {} is out of range for time base {}",
                fracsec, time_base
            ),
        });
    }
    let nanos = (fracsec as u64 * 1_000_000_000).div_ceil(time_base as u64) as u32;
    Utc.timestamp_opt(soc as i64, nanos)
        .single()
        .ok_or_else(|| ParseError::InvalidFormat {
            message: format!("SOC {} is not a representable instant", soc),
        })
}

/// Bounds-checked big-endian reader over a frame body.
///
/// Every read reports `ParseError::InvalidLength` with the frame name instead of
/// panicking when the body is truncated.
pub(crate) struct FrameReader<'a> {
    buf: &'a [u8],
    context: &'static str,
}

impl<'a> FrameReader<'a> {
    pub(crate) fn new(buf: &'a [u8], context: &'static str) -> Self {
        FrameReader { buf, context }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, len: usize, field: &str) -> Result<(), ParseError> {
        if self.buf.remaining() < len {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "{}: {} needs {} bytes but only {} remain",
                    self.context,
                    field,
                    len,
                    self.buf.remaining()
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn u16(&mut self, field: &str) -> Result<u16, ParseError> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn i16(&mut self, field: &str) -> Result<i16, ParseError> {
        self.need(2, field)?;
        Ok(self.buf.get_i16())
    }

    pub(crate) fn u32(&mut self, field: &str) -> Result<u32, ParseError> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn f32(&mut self, field: &str) -> Result<f32, ParseError> {
        self.need(4, field)?;
        Ok(self.buf.get_f32())
    }

    pub(crate) fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], ParseError> {
        self.need(len, field)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

/// Copies a label into a fixed 16-byte, space padded field.
///
/// Labels longer than 16 bytes are truncated; non-ASCII characters are replaced by `?`.
pub fn to_fixed_label(label: &str) -> [u8; 16] {
    let mut field = [b' '; 16];
    for (slot, ch) in field.iter_mut().zip(label.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    field
}

/// Reads a fixed 16-byte label, trimming padding.
pub fn from_fixed_label(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}
