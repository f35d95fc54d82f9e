//! # IEEE C37.118 Configuration Frames
//!
//! Configuration frames (CFG-1 and CFG-2) describe every device cell a concentrator
//! publishes: station name, ID code, data format, channel names, conversion factors,
//! nominal frequency and the configuration change count.
//!
//! ## Key Components
//!
//! - `PhasorDefinition`, `FrequencyDefinition`, `AnalogDefinition`,
//!   `DigitalDefinition`: Typed channel definitions of a cell.
//! - `ConfigurationCell`: One device's configuration.
//! - `ConfigurationFrame`: The complete frame, with binary encode and decode.
//!
//! ## Usage
//!
//! The concentrator builds a `ConfigurationFrame` from device descriptors, keeps it as its
//! live configuration and serves its wire image on request. Data frames size and decode
//! themselves from the same frame.

use bytes::BufMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{expect_frame, FrameType, ParseError, PrefixFrame, Version};
use super::flags::FormatFlags;
use super::phasors::PhasorFormat;
use super::units::{
    AnalogType, AnalogUnits, DigitalUnits, NominalFrequency, PhasorType, PhasorUnits,
};
use super::utils::{
    from_fixed_label, from_soc_fracsec, seal_frame, to_fixed_label, to_soc_fracsec,
    validate_checksum, FrameReader,
};

/// Number of bits, and so of channel names, in one digital status word.
pub const DIGITAL_LABEL_COUNT: usize = 16;

/// Fixed width of every station and channel name.
pub const LABEL_LENGTH: usize = 16;

/// Definition of one phasor channel.
///
/// # Fields
///
/// * `label`: Channel name, at most 16 bytes on the wire.
/// * `phasor_type`: Voltage or current.
/// * `scaling_value`: PHUNIT conversion factor (24-bit, 10⁻⁵ V or A per bit).
/// * `offset`: Added to decoded integer values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorDefinition {
    pub label: String,
    pub phasor_type: PhasorType,
    pub scaling_value: u32,
    pub offset: f64,
}

impl PhasorDefinition {
    pub fn units(&self) -> PhasorUnits {
        PhasorUnits {
            phasor_type: self.phasor_type,
            scale_factor: self.scaling_value & 0x00FF_FFFF,
        }
    }

    /// Engineering units per integer count.
    pub fn conversion_factor(&self) -> f64 {
        self.units().conversion_factor()
    }
}

/// Definition of the frequency and dF/dt channels of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDefinition {
    pub label: String,
    pub offset: f64,
}

/// Definition of one analog channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogDefinition {
    pub label: String,
    pub analog_type: AnalogType,
    pub scaling_value: i32,
    pub offset: f64,
}

impl AnalogDefinition {
    pub fn units(&self) -> AnalogUnits {
        AnalogUnits {
            analog_type: self.analog_type,
            scale_factor: self.scaling_value,
        }
    }
}

/// Definition of one 16-bit digital status word.
///
/// Each bit carries its own 16-byte name on the wire, so `labels` always holds exactly
/// 16 entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalDefinition {
    pub labels: Vec<String>,
    pub units: DigitalUnits,
}

impl DigitalDefinition {
    /// Creates a definition from a combined label and 32-bit mask.
    ///
    /// A label made of 16 `|` separated names gets one name per bit. Any other label is
    /// laid out across the 16 name slots, 16 characters per slot.
    pub fn from_label(label: &str, mask: u32) -> Self {
        let parts: Vec<&str> = label.split('|').collect();
        let labels = if parts.len() == DIGITAL_LABEL_COUNT {
            parts.iter().map(|part| part.trim().to_string()).collect()
        } else {
            let chars: Vec<char> = label.chars().collect();
            (0..DIGITAL_LABEL_COUNT)
                .map(|slot| {
                    chars
                        .iter()
                        .skip(slot * LABEL_LENGTH)
                        .take(LABEL_LENGTH)
                        .collect::<String>()
                        .trim_end()
                        .to_string()
                })
                .collect()
        };
        DigitalDefinition {
            labels,
            units: DigitalUnits::from_mask(mask),
        }
    }

    /// The bit names joined with `|`.
    pub fn combined_label(&self) -> String {
        self.labels.join("|")
    }
}

/// One device's configuration inside a configuration frame.
///
/// `id_label` and `is_virtual` are not carried on the wire and decode as empty/false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationCell {
    pub station_name: String,
    pub id_label: String,
    pub id_code: u16,
    pub format: FormatFlags,
    pub phasors: Vec<PhasorDefinition>,
    pub frequency: FrequencyDefinition,
    pub analogs: Vec<AnalogDefinition>,
    pub digitals: Vec<DigitalDefinition>,
    pub nominal_frequency: NominalFrequency,
    pub revision_count: u16,
    pub is_virtual: bool,
}

impl ConfigurationCell {
    pub fn phasor_format(&self) -> PhasorFormat {
        PhasorFormat::from_format_flags(self.format)
    }

    /// Size of this cell's block inside a data frame.
    pub fn data_size(&self) -> usize {
        2 + self.phasors.len() * self.format.phasor_size()
            + 2 * self.format.frequency_size()
            + self.analogs.len() * self.format.analog_size()
            + 2 * self.digitals.len()
    }

    /// Number of individual values a data cell must receive to be complete: angle and
    /// magnitude per phasor, frequency, dF/dt, one per analog and one per digital word.
    pub fn value_count(&self) -> usize {
        2 * self.phasors.len() + 2 + self.analogs.len() + self.digitals.len()
    }

    /// Cell size on the wire, including FNOM and CFGCNT.
    pub fn encoded_size(&self) -> usize {
        let channels =
            self.phasors.len() + self.analogs.len() + DIGITAL_LABEL_COUNT * self.digitals.len();
        let names = LABEL_LENGTH * channels;
        let units = 4 * (self.phasors.len() + self.analogs.len() + self.digitals.len());
        LABEL_LENGTH + 2 + 2 + 6 + names + units + 2 + 2
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.put_slice(&to_fixed_label(&self.station_name));
        out.put_u16(self.id_code);
        out.put_u16(self.format.raw());
        out.put_u16(self.phasors.len() as u16);
        out.put_u16(self.analogs.len() as u16);
        out.put_u16(self.digitals.len() as u16);
        for phasor in &self.phasors {
            out.put_slice(&to_fixed_label(&phasor.label));
        }
        for analog in &self.analogs {
            out.put_slice(&to_fixed_label(&analog.label));
        }
        for digital in &self.digitals {
            for slot in 0..DIGITAL_LABEL_COUNT {
                let label = digital.labels.get(slot).map(String::as_str).unwrap_or("");
                out.put_slice(&to_fixed_label(label));
            }
        }
        for phasor in &self.phasors {
            out.put_slice(&phasor.units().to_hex());
        }
        for analog in &self.analogs {
            out.put_slice(&analog.units().to_hex());
        }
        for digital in &self.digitals {
            out.put_slice(&digital.units.to_hex());
        }
        out.put_slice(&self.nominal_frequency.to_hex());
        out.put_u16(self.revision_count);
    }

    fn read_from(reader: &mut FrameReader<'_>) -> Result<Self, ParseError> {
        let station_name = from_fixed_label(reader.take(LABEL_LENGTH, "STN")?);
        let id_code = reader.u16("IDCODE")?;
        let format = FormatFlags::from_raw(reader.u16("FORMAT")?);
        let phnmr = reader.u16("PHNMR")? as usize;
        let annmr = reader.u16("ANNMR")? as usize;
        let dgnmr = reader.u16("DGNMR")? as usize;

        let mut phasor_labels = Vec::with_capacity(phnmr);
        for _ in 0..phnmr {
            phasor_labels.push(from_fixed_label(reader.take(LABEL_LENGTH, "CHNAM")?));
        }
        let mut analog_labels = Vec::with_capacity(annmr);
        for _ in 0..annmr {
            analog_labels.push(from_fixed_label(reader.take(LABEL_LENGTH, "CHNAM")?));
        }
        let mut digital_labels = Vec::with_capacity(dgnmr);
        for _ in 0..dgnmr {
            let mut labels = Vec::with_capacity(DIGITAL_LABEL_COUNT);
            for _ in 0..DIGITAL_LABEL_COUNT {
                labels.push(from_fixed_label(reader.take(LABEL_LENGTH, "CHNAM")?));
            }
            digital_labels.push(labels);
        }

        let mut phasors = Vec::with_capacity(phnmr);
        for label in phasor_labels {
            let units = PhasorUnits::from_hex(reader.take(4, "PHUNIT")?)?;
            phasors.push(PhasorDefinition {
                label,
                phasor_type: units.phasor_type,
                scaling_value: units.scale_factor,
                offset: 0.0,
            });
        }
        let mut analogs = Vec::with_capacity(annmr);
        for label in analog_labels {
            let units = AnalogUnits::from_hex(reader.take(4, "ANUNIT")?)?;
            analogs.push(AnalogDefinition {
                label,
                analog_type: units.analog_type,
                scaling_value: units.scale_factor,
                offset: 0.0,
            });
        }
        let mut digitals = Vec::with_capacity(dgnmr);
        for labels in digital_labels {
            digitals.push(DigitalDefinition {
                labels,
                units: DigitalUnits::from_hex(reader.take(4, "DIGUNIT")?)?,
            });
        }
        let nominal_frequency = NominalFrequency::from_hex(reader.take(2, "FNOM")?)?;
        let revision_count = reader.u16("CFGCNT")?;

        Ok(ConfigurationCell {
            frequency: FrequencyDefinition {
                label: format!("{} Freq", station_name),
                offset: 0.0,
            },
            station_name,
            id_label: String::new(),
            id_code,
            format,
            phasors,
            analogs,
            digitals,
            nominal_frequency,
            revision_count,
            is_virtual: false,
        })
    }
}

/// A complete configuration frame.
///
/// # Fields
///
/// * `frame_type`: `Config1` or `Config2`.
/// * `version`: Protocol revision written to SYNC.
/// * `id_code`: Stream ID code.
/// * `timestamp`: Creation instant, written to SOC/FRACSEC.
/// * `time_base`: Fraction-of-second resolution (24-bit).
/// * `frame_rate`: Data frames per second.
/// * `cells`: Device cells in publication order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    pub frame_type: FrameType,
    pub version: Version,
    pub id_code: u16,
    pub timestamp: DateTime<Utc>,
    pub time_base: u32,
    pub frame_rate: i16,
    pub cells: Vec<ConfigurationCell>,
}

impl ConfigurationFrame {
    /// Revision count shared by all cells, or 0 for an empty frame.
    pub fn revision_count(&self) -> u16 {
        self.cells.first().map(|cell| cell.revision_count).unwrap_or(0)
    }

    /// Returns a copy of this frame reporting as `frame_type`.
    pub fn with_frame_type(&self, frame_type: FrameType) -> Self {
        ConfigurationFrame {
            frame_type,
            ..self.clone()
        }
    }

    pub fn cell_index(&self, id_code: u16) -> Option<usize> {
        self.cells.iter().position(|cell| cell.id_code == id_code)
    }

    /// Expected size of a data frame built against this configuration.
    pub fn calc_data_frame_size(&self) -> usize {
        16 + self.cells.iter().map(ConfigurationCell::data_size).sum::<usize>()
    }

    /// Encodes the frame, FRAMESIZE and checksum included.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidLength)`: If the image would exceed 65535 bytes.
    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let body_size: usize = self.cells.iter().map(ConfigurationCell::encoded_size).sum();
        let mut out = Vec::with_capacity(14 + 6 + body_size + 4);

        let mut prefix = PrefixFrame::new(self.frame_type, self.id_code, self.version);
        let (soc, fracsec) = to_soc_fracsec(self.timestamp, self.time_base);
        prefix.soc = soc;
        prefix.fracsec = fracsec;
        out.put_slice(&prefix.to_hex());

        out.put_u32(self.time_base & 0x00FF_FFFF);
        out.put_u16(self.cells.len() as u16);
        for cell in &self.cells {
            cell.write_to(&mut out);
        }
        out.put_i16(self.frame_rate);
        seal_frame(&mut out)?;
        Ok(out)
    }

    /// Parses a CFG-1 or CFG-2 frame image.
    ///
    /// # Returns
    ///
    /// * `Ok(ConfigurationFrame)`: The parsed frame.
    /// * `Err(ParseError)`: If the image is truncated, carries a different frame type,
    ///   disagrees with FRAMESIZE or fails its checksum.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        let (prefix, frame_type) = expect_frame(
            bytes,
            &[FrameType::Config1, FrameType::Config2],
            "ConfigurationFrame",
        )?;
        validate_checksum(bytes)?;

        let mut reader = FrameReader::new(&bytes[14..bytes.len() - 2], "ConfigurationFrame");
        let time_base = reader.u32("TIME_BASE")? & 0x00FF_FFFF;
        let num_pmu = reader.u16("NUM_PMU")?;
        let mut cells = Vec::with_capacity(num_pmu as usize);
        for _ in 0..num_pmu {
            cells.push(ConfigurationCell::read_from(&mut reader)?);
        }
        let frame_rate = reader.i16("DATA_RATE")?;
        if reader.remaining() != 0 {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "ConfigurationFrame: {} unexpected trailing bytes",
                    reader.remaining()
                ),
            });
        }

        Ok(ConfigurationFrame {
            frame_type,
            version: prefix.version,
            id_code: prefix.idcode,
            timestamp: from_soc_fracsec(prefix.soc, prefix.fracsec, time_base)?,
            time_base,
            frame_rate,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::flags::{CoordinateFormat, DataFormat};
    use chrono::TimeZone;

    fn sample_cell() -> ConfigurationCell {
        ConfigurationCell {
            station_name: "Station A".to_string(),
            id_label: "STA".to_string(),
            id_code: 7734,
            format: FormatFlags::new(
                DataFormat::FixedInteger,
                CoordinateFormat::Rectangular,
                DataFormat::FixedInteger,
                DataFormat::FloatingPoint,
            ),
            phasors: vec![
                PhasorDefinition {
                    label: "VA".to_string(),
                    phasor_type: PhasorType::Voltage,
                    scaling_value: 915527,
                    offset: 0.0,
                },
                PhasorDefinition {
                    label: "I1".to_string(),
                    phasor_type: PhasorType::Current,
                    scaling_value: 45776,
                    offset: 0.0,
                },
            ],
            frequency: FrequencyDefinition {
                label: "STA Freq".to_string(),
                offset: 0.0,
            },
            analogs: vec![AnalogDefinition {
                label: "ANALOG1".to_string(),
                analog_type: AnalogType::SinglePointOnWave,
                scaling_value: 1,
                offset: 0.0,
            }],
            digitals: vec![DigitalDefinition::from_label("BREAKER 1 STATUS", 0xFFFF_0000)],
            nominal_frequency: NominalFrequency::Hz60,
            revision_count: 0,
            is_virtual: false,
        }
    }

    fn sample_frame() -> ConfigurationFrame {
        ConfigurationFrame {
            frame_type: FrameType::Config2,
            version: Version::V2005,
            id_code: 7734,
            timestamp: Utc.timestamp_opt(1_149_577_200, 0).single().unwrap(),
            time_base: 1_000_000,
            frame_rate: 30,
            cells: vec![sample_cell()],
        }
    }

    #[test]
    fn test_configuration_frame_size_matches_layout() {
        let frame = sample_frame();
        let image = frame.to_hex().unwrap();
        // prefix 14, time base 4, num_pmu 2, cell, data rate 2, crc 2
        let cell_size = 16 + 2 + 2 + 6 + 16 * (2 + 1 + 16) + 4 * 4 + 2 + 2;
        assert_eq!(image.len(), 14 + 4 + 2 + cell_size + 2 + 2);
        assert_eq!(u16::from_be_bytes([image[2], image[3]]) as usize, image.len());
        assert_eq!(&image[0..2], &[0xAA, 0x31]);
        assert!(validate_checksum(&image).is_ok());
    }

    #[test]
    fn test_configuration_frame_parses_back() {
        let frame = sample_frame();
        let parsed = ConfigurationFrame::from_hex(&frame.to_hex().unwrap()).unwrap();
        assert_eq!(parsed.frame_type, FrameType::Config2);
        assert_eq!(parsed.time_base, 1_000_000);
        assert_eq!(parsed.timestamp, frame.timestamp);
        assert_eq!(parsed.cells.len(), 1);

        let cell = &parsed.cells[0];
        assert_eq!(cell.station_name, "Station A");
        assert_eq!(cell.phasors[1].phasor_type, PhasorType::Current);
        assert_eq!(cell.phasors[1].scaling_value, 45776);
        assert_eq!(cell.digitals[0].labels[0], "BREAKER 1 STATUS");
        assert_eq!(cell.digitals[0].units.valid_inputs, 0xFFFF);
        assert_eq!(parsed.calc_data_frame_size(), frame.calc_data_frame_size());
    }

    #[test]
    fn test_config1_copy_changes_sync_only() {
        let frame = sample_frame();
        let cfg1 = frame.with_frame_type(FrameType::Config1);
        let image1 = cfg1.to_hex().unwrap();
        let image2 = frame.to_hex().unwrap();
        assert_eq!(image1[1], 0x21);
        assert_eq!(image1[2..image1.len() - 2], image2[2..image2.len() - 2]);
    }

    #[test]
    fn test_rejects_corrupted_image() {
        let mut image = sample_frame().to_hex().unwrap();
        image[30] ^= 0xFF;
        assert!(matches!(
            ConfigurationFrame::from_hex(&image),
            Err(ParseError::InvalidChecksum { .. })
        ));
        assert!(ConfigurationFrame::from_hex(&image[..20]).is_err());
    }

    #[test]
    fn test_digital_label_packing() {
        let names: Vec<String> = (0..16).map(|bit| format!("BIT{}", bit)).collect();
        let packed = DigitalDefinition::from_label(&names.join("|"), 0);
        assert_eq!(packed.labels.len(), 16);
        assert_eq!(packed.labels[15], "BIT15");

        let spread = DigitalDefinition::from_label("ABCDEFGHIJKLMNOPQRST", 0);
        assert_eq!(spread.labels[0], "ABCDEFGHIJKLMNOP");
        assert_eq!(spread.labels[1], "QRST");
        assert_eq!(spread.labels[2], "");
    }

    #[test]
    fn test_data_size_follows_format() {
        let cell = sample_cell();
        // STAT 2, 2 int phasors 8, int freq/dfdt 4, float analog 4, digital 2
        assert_eq!(cell.data_size(), 2 + 8 + 4 + 4 + 2);
        assert_eq!(cell.value_count(), 4 + 2 + 1 + 1);
    }
}
