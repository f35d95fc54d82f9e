//! # IEEE C37.118 Header Frames
//!
//! A header frame is a human readable ASCII description of a data stream, sent in reply
//! to a `SendHeaderFrame` command.

use bytes::BufMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{
    expect_frame, FrameType, ParseError, PrefixFrame, Version, MAXIMUM_DATA_LENGTH,
};
use super::utils::{from_soc_fracsec, seal_frame, to_soc_fracsec, validate_checksum};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFrame {
    pub id_code: u16,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub time_base: u32,
    pub text: String,
}

impl HeaderFrame {
    /// Encodes the header. Non-ASCII characters are sent as `?`.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidLength)`: If the text does not fit in one frame.
    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        if self.text.len() > MAXIMUM_DATA_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Header text of {} bytes exceeds the {} byte limit",
                    self.text.len(),
                    MAXIMUM_DATA_LENGTH
                ),
            });
        }
        let mut prefix = PrefixFrame::new(FrameType::Header, self.id_code, self.version);
        let (soc, fracsec) = to_soc_fracsec(self.timestamp, self.time_base);
        prefix.soc = soc;
        prefix.fracsec = fracsec;

        let mut out = Vec::with_capacity(16 + self.text.len());
        out.put_slice(&prefix.to_hex());
        for ch in self.text.chars() {
            out.put_u8(if ch.is_ascii() { ch as u8 } else { b'?' });
        }
        seal_frame(&mut out)?;
        Ok(out)
    }

    /// Parses a header frame; the time base is needed to interpret FRACSEC.
    pub fn from_hex(bytes: &[u8], time_base: u32) -> Result<Self, ParseError> {
        let (prefix, _) = expect_frame(bytes, &[FrameType::Header], "HeaderFrame")?;
        validate_checksum(bytes)?;
        let body = &bytes[14..bytes.len() - 2];
        if !body.is_ascii() {
            return Err(ParseError::InvalidHeader {
                message: "Header frame text is not ASCII".to_string(),
            });
        }
        Ok(HeaderFrame {
            id_code: prefix.idcode,
            version: prefix.version,
            timestamp: from_soc_fracsec(prefix.soc, prefix.fracsec, time_base)?,
            time_base,
            text: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_frame_parses_back() {
        let header = HeaderFrame {
            id_code: 235,
            version: Version::V2011,
            timestamp: Utc.timestamp_opt(1_149_580_800, 500_000_000).single().unwrap(),
            time_base: 1_000_000,
            text: "IEEE C37.118 Concentrator:\n".to_string(),
        };
        let image = header.to_hex().unwrap();
        assert_eq!(image[1], 0x12);
        assert_eq!(image.len(), 16 + header.text.len());
        assert_eq!(HeaderFrame::from_hex(&image, 1_000_000).unwrap(), header);
    }

    #[test]
    fn test_non_ascii_text_is_replaced() {
        let header = HeaderFrame {
            id_code: 1,
            version: Version::V2005,
            timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
            time_base: 30,
            text: "50 µs".to_string(),
        };
        let image = header.to_hex().unwrap();
        let parsed = HeaderFrame::from_hex(&image, 30).unwrap();
        assert_eq!(parsed.text, "50 ?s");
    }
}
