//! # IEEE C37.118 Data Frames
//!
//! A data frame carries one timestamp's measurements for every cell of a configuration
//! frame: a STAT word followed by phasors, frequency, dF/dt, analogs and digital words,
//! each encoded as selected by the cell's FORMAT word.
//!
//! ## Key Components
//!
//! - `DataCell`: Engineering values for one device plus its `StatusFlags`. Tracks which
//!   values have been assigned so incomplete cells can be flagged.
//! - `DataFrame`: Ordered cells for one timestamp, tied to the configuration frame they
//!   were built against.
//!
//! ## Usage
//!
//! The concentrator creates a fresh `DataFrame` for every publication slot, assigns the
//! measurements it received and encodes it with `to_hex`. Clients decode with `from_hex`
//! and the configuration frame they were sent.

use std::sync::Arc;

use bytes::BufMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{expect_frame, FrameType, ParseError, PrefixFrame};
use super::config::{ConfigurationCell, ConfigurationFrame};
use super::flags::{DataFormat, StatusFlags, StatusUpdate, TimeQualityFlags};
use super::phasors::{Phasor, PhasorValue};
use super::utils::{
    from_soc_fracsec, seal_frame, to_soc_fracsec, validate_checksum, FrameReader,
};

fn to_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Measurements of one device for one timestamp.
///
/// Values are written through the `set_*` methods, which record the assignment. The
/// vectors are sized from the cell's configuration when the cell is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCell {
    pub status: StatusFlags,
    pub phasors: Vec<Phasor>,
    pub frequency: f64,
    pub dfdt: f64,
    pub analogs: Vec<f64>,
    pub digitals: Vec<u16>,
    #[serde(skip)]
    assigned: Vec<bool>,
}

impl DataCell {
    /// Creates an empty cell shaped after `configuration`.
    pub fn new(configuration: &ConfigurationCell) -> Self {
        DataCell {
            status: StatusFlags::default(),
            phasors: vec![Phasor::default(); configuration.phasors.len()],
            frequency: configuration.nominal_frequency.hz(),
            dfdt: 0.0,
            analogs: vec![0.0; configuration.analogs.len()],
            digitals: vec![0; configuration.digitals.len()],
            assigned: vec![false; configuration.value_count()],
        }
    }

    fn mark(&mut self, slot: usize) {
        if let Some(assigned) = self.assigned.get_mut(slot) {
            *assigned = true;
        }
    }

    pub fn set_magnitude(&mut self, index: usize, value: f64) -> bool {
        match self.phasors.get_mut(index) {
            Some(phasor) => {
                phasor.magnitude = value;
                self.mark(2 * index);
                true
            }
            None => false,
        }
    }

    /// Sets a phasor angle in radians.
    pub fn set_angle(&mut self, index: usize, radians: f64) -> bool {
        match self.phasors.get_mut(index) {
            Some(phasor) => {
                phasor.angle = radians;
                self.mark(2 * index + 1);
                true
            }
            None => false,
        }
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz;
        self.mark(2 * self.phasors.len());
    }

    pub fn set_dfdt(&mut self, dfdt: f64) {
        self.dfdt = dfdt;
        self.mark(2 * self.phasors.len() + 1);
    }

    pub fn set_analog(&mut self, index: usize, value: f64) -> bool {
        let slot = 2 * self.phasors.len() + 2 + index;
        match self.analogs.get_mut(index) {
            Some(analog) => {
                *analog = value;
                self.mark(slot);
                true
            }
            None => false,
        }
    }

    pub fn set_digital(&mut self, index: usize, word: u16) -> bool {
        let slot = 2 * self.phasors.len() + 2 + self.analogs.len() + index;
        match self.digitals.get_mut(index) {
            Some(digital) => {
                *digital = word;
                self.mark(slot);
                true
            }
            None => false,
        }
    }

    pub fn apply_status(&mut self, update: StatusUpdate) {
        self.status = self.status.apply(update);
    }

    /// `true` once every value of the cell has been set at least once.
    pub fn all_values_assigned(&self) -> bool {
        self.assigned.iter().all(|assigned| *assigned)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.iter().filter(|assigned| **assigned).count()
    }

    fn write_to(&self, configuration: &ConfigurationCell, out: &mut Vec<u8>) {
        let format = configuration.format;
        out.put_u16(self.status.raw());

        let phasor_format = configuration.phasor_format();
        for (phasor, definition) in self.phasors.iter().zip(&configuration.phasors) {
            phasor
                .encode(phasor_format, definition.conversion_factor(), definition.offset)
                .write_to(out);
        }

        match format.frequency_format() {
            DataFormat::FloatingPoint => {
                out.put_f32(self.frequency as f32);
                out.put_f32(self.dfdt as f32);
            }
            DataFormat::FixedInteger => {
                let deviation = self.frequency - configuration.nominal_frequency.hz();
                out.put_i16(to_i16(deviation * 1000.0));
                out.put_i16(to_i16(self.dfdt * 100.0));
            }
        }

        for (value, definition) in self.analogs.iter().zip(&configuration.analogs) {
            match format.analog_format() {
                DataFormat::FloatingPoint => out.put_f32(*value as f32),
                DataFormat::FixedInteger => {
                    let factor = definition.units().conversion_factor();
                    let raw = if factor == 0.0 {
                        0
                    } else {
                        to_i16((value - definition.offset) / factor)
                    };
                    out.put_i16(raw);
                }
            }
        }

        for word in &self.digitals {
            out.put_u16(*word);
        }
    }

    fn read_from(
        configuration: &ConfigurationCell,
        reader: &mut FrameReader<'_>,
    ) -> Result<Self, ParseError> {
        let format = configuration.format;
        let mut cell = DataCell::new(configuration);
        cell.status = StatusFlags::from_raw(reader.u16("STAT")?);

        let phasor_format = configuration.phasor_format();
        for (index, definition) in configuration.phasors.iter().enumerate() {
            let raw = reader.take(phasor_format.size(), "PHASORS")?;
            cell.phasors[index] = PhasorValue::from_hex(raw, phasor_format)?
                .to_phasor(definition.conversion_factor(), definition.offset);
        }

        match format.frequency_format() {
            DataFormat::FloatingPoint => {
                cell.frequency = reader.f32("FREQ")? as f64;
                cell.dfdt = reader.f32("DFREQ")? as f64;
            }
            DataFormat::FixedInteger => {
                cell.frequency =
                    configuration.nominal_frequency.hz() + reader.i16("FREQ")? as f64 / 1000.0;
                cell.dfdt = reader.i16("DFREQ")? as f64 / 100.0;
            }
        }

        for (index, definition) in configuration.analogs.iter().enumerate() {
            cell.analogs[index] = match format.analog_format() {
                DataFormat::FloatingPoint => reader.f32("ANALOG")? as f64,
                DataFormat::FixedInteger => {
                    reader.i16("ANALOG")? as f64 * definition.units().conversion_factor()
                        + definition.offset
                }
            };
        }

        for index in 0..configuration.digitals.len() {
            cell.digitals[index] = reader.u16("DIGITAL")?;
        }

        cell.assigned.iter_mut().for_each(|assigned| *assigned = true);
        Ok(cell)
    }
}

/// One timestamp's measurements for every cell of a configuration frame.
///
/// # Fields
///
/// * `configuration`: The configuration frame the cells were shaped after.
/// * `timestamp`: Measurement instant, written to SOC/FRACSEC.
/// * `time_quality`: Frame-level time quality flags.
/// * `cells`: One entry per configuration cell, same order.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub configuration: Arc<ConfigurationFrame>,
    pub timestamp: DateTime<Utc>,
    pub time_quality: TimeQualityFlags,
    pub cells: Vec<DataCell>,
}

impl DataFrame {
    /// Creates a frame with one empty cell per configuration cell.
    pub fn new(configuration: Arc<ConfigurationFrame>, timestamp: DateTime<Utc>) -> Self {
        let cells = configuration.cells.iter().map(DataCell::new).collect();
        DataFrame {
            configuration,
            timestamp,
            time_quality: TimeQualityFlags::default(),
            cells,
        }
    }

    /// Encodes the frame, FRAMESIZE and checksum included.
    ///
    /// # Returns
    ///
    /// * `Err(ParseError::InvalidFormat)`: If the cell count disagrees with the
    ///   configuration.
    /// * `Err(ParseError::InvalidLength)`: If the image would exceed 65535 bytes.
    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let configuration = &self.configuration;
        if self.cells.len() != configuration.cells.len() {
            return Err(ParseError::InvalidFormat {
                message: format!(
                    "DataFrame holds {} cells but its configuration defines {}",
                    self.cells.len(),
                    configuration.cells.len()
                ),
            });
        }

        let mut out = Vec::with_capacity(configuration.calc_data_frame_size());
        let mut prefix =
            PrefixFrame::new(FrameType::Data, configuration.id_code, configuration.version);
        let (soc, fracsec) = to_soc_fracsec(self.timestamp, configuration.time_base);
        prefix.soc = soc;
        prefix.fracsec = fracsec;
        prefix.set_time_quality_flags(self.time_quality);
        out.put_slice(&prefix.to_hex());

        for (cell, cell_configuration) in self.cells.iter().zip(&configuration.cells) {
            cell.write_to(cell_configuration, &mut out);
        }
        seal_frame(&mut out)?;
        Ok(out)
    }

    /// Parses a data frame image using the configuration frame that describes it.
    ///
    /// # Returns
    ///
    /// * `Ok(DataFrame)`: The decoded frame.
    /// * `Err(ParseError)`: If the image is not a data frame, fails its checksum or does
    ///   not match the configuration's layout.
    pub fn from_hex(
        bytes: &[u8],
        configuration: Arc<ConfigurationFrame>,
    ) -> Result<Self, ParseError> {
        let (prefix, _) = expect_frame(bytes, &[FrameType::Data], "DataFrame")?;
        validate_checksum(bytes)?;
        if bytes.len() != configuration.calc_data_frame_size() {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "DataFrame: expected {} bytes for the configuration, got {}",
                    configuration.calc_data_frame_size(),
                    bytes.len()
                ),
            });
        }

        let mut reader = FrameReader::new(&bytes[14..bytes.len() - 2], "DataFrame");
        let mut cells = Vec::with_capacity(configuration.cells.len());
        for cell_configuration in &configuration.cells {
            cells.push(DataCell::read_from(cell_configuration, &mut reader)?);
        }

        Ok(DataFrame {
            timestamp: from_soc_fracsec(prefix.soc, prefix.fracsec, configuration.time_base)?,
            time_quality: prefix.time_quality_flags(),
            configuration,
            cells,
        })
    }
}
