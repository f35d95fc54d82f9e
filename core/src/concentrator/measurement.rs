//! Individual time-tagged values addressed to one signal of one output cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ieee_c37_118::data_frame::DataFrame;
use crate::ieee_c37_118::flags::{DataSortingType, StatusFlags, StatusUpdate, TimeQualityFlags};

/// Which value of a cell a measurement feeds.
///
/// `Angle` values are in degrees. `Status`, `Digital` and `Quality` values carry raw
/// words (STAT, a digital word and the FRACSEC time quality byte respectively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Angle,
    Magnitude,
    Frequency,
    DfDt,
    Status,
    Digital,
    Analog,
    Quality,
}

/// Address of one value: output cell, kind and channel index within that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalReference {
    pub cell_index: usize,
    pub kind: SignalKind,
    pub index: usize,
}

impl SignalReference {
    pub fn new(cell_index: usize, kind: SignalKind, index: usize) -> Self {
        SignalReference {
            cell_index,
            kind,
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub signal: SignalReference,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Set when the source could not trust the timestamp.
    pub bad_timestamp: bool,
}

impl Measurement {
    pub fn new(signal: SignalReference, timestamp: DateTime<Utc>, value: f64) -> Self {
        Measurement {
            signal,
            timestamp,
            value,
            bad_timestamp: false,
        }
    }
}

/// Writes one measurement into `frame`.
///
/// # Parameters
///
/// * `frame`: The frame of the measurement's slot.
/// * `measurement`: Value and target signal.
/// * `allow_sorts_by_arrival`: Whether a cell reporting lost synchronization, or fed by
///   a measurement sorted by arrival, is flagged as sorted by arrival.
/// * `sorted_by_arrival`: The measurement was placed by arrival time.
///
/// # Returns
///
/// `false` when the signal does not exist in the frame's configuration.
pub fn apply_measurement(
    frame: &mut DataFrame,
    measurement: &Measurement,
    allow_sorts_by_arrival: bool,
    sorted_by_arrival: bool,
) -> bool {
    let signal = measurement.signal;
    if signal.kind == SignalKind::Quality {
        frame.time_quality = TimeQualityFlags::from_raw(measurement.value as u32);
        return true;
    }

    let Some(cell) = frame.cells.get_mut(signal.cell_index) else {
        return false;
    };
    let value = measurement.value;
    let assigned = match signal.kind {
        SignalKind::Angle => cell.set_angle(signal.index, value.to_radians()),
        SignalKind::Magnitude => cell.set_magnitude(signal.index, value),
        SignalKind::Frequency => {
            cell.set_frequency(value);
            true
        }
        SignalKind::DfDt => {
            cell.set_dfdt(value);
            true
        }
        SignalKind::Analog => cell.set_analog(signal.index, value),
        SignalKind::Digital => cell.set_digital(signal.index, value as u16),
        SignalKind::Status => {
            cell.status = StatusFlags::from_raw(value as u16);
            if allow_sorts_by_arrival && !cell.status.synchronization_is_valid() {
                cell.apply_status(StatusUpdate::SortingType(DataSortingType::ByArrival));
            }
            true
        }
        // frame level, assigned above
        SignalKind::Quality => false,
    };

    if assigned && sorted_by_arrival && allow_sorts_by_arrival {
        cell.apply_status(StatusUpdate::SortingType(DataSortingType::ByArrival));
    }
    assigned
}
