//! # Simulated Devices and Measurements
//!
//! Generates device descriptors and measurement sets that look like a substation PMU:
//! three voltage phasors, one current phasor, a few analogs and one digital word per
//! device. Used by `pdc serve` when no device file is given, and by tests and benches.
//!
//! ## Key Components
//!
//! - `random_base_configuration`: A `BaseConfigurationFrame` with simulated devices.
//! - `simulated_measurements`: One measurement for every value of every cell.

use chrono::{DateTime, Utc};
use rand::Rng;

use super::descriptor::{
    AnalogDescriptor, BaseConfigurationFrame, DeviceDescriptor, DigitalDescriptor,
    FrequencyDescriptor, PhasorDescriptor,
};
use super::measurement::{Measurement, SignalKind, SignalReference};
use crate::ieee_c37_118::config::ConfigurationFrame;
use crate::ieee_c37_118::units::{AnalogType, PhasorType};

const FIRST_DEVICE_ID_CODE: u16 = 1000;
const NOMINAL_VOLTAGE: f64 = 134_000.0;
const NOMINAL_CURRENT: f64 = 500.0;

/// Creates a simulated device.
///
/// # Parameters
///
/// * `index`: Station index, used for the name and ID code.
///
/// # Returns
///
/// A device named `STATION{index}` with ID code `1000 + index`.
pub fn random_device<R: Rng>(index: usize, rng: &mut R) -> DeviceDescriptor {
    let acronym = format!("STA{:02}", index);
    let mut phasors: Vec<PhasorDescriptor> = ["VA", "VB", "VC"]
        .iter()
        .map(|phase| PhasorDescriptor {
            label: format!("{} {}", acronym, phase),
            phasor_type: PhasorType::Voltage,
            scaling_value: 915_527,
            offset: 0.0,
        })
        .collect();
    phasors.push(PhasorDescriptor {
        label: format!("{} I1", acronym),
        phasor_type: PhasorType::Current,
        scaling_value: 0,
        offset: 0.0,
    });

    let analog_count = rng.random_range(0..=3);
    let analogs = (0..analog_count)
        .map(|channel| AnalogDescriptor {
            label: format!("{} AN{}", acronym, channel),
            analog_type: match channel {
                0 => AnalogType::SinglePointOnWave,
                1 => AnalogType::RmsOfAnalogInput,
                _ => AnalogType::PeakOfAnalogInput,
            },
            scaling_value: 0,
            offset: 0.0,
        })
        .collect();

    DeviceDescriptor {
        id_code: FIRST_DEVICE_ID_CODE.wrapping_add(index as u16),
        station_name: format!("STATION{:02}", index),
        id_label: acronym.clone(),
        nominal_frequency: None,
        data_format: None,
        coordinate_format: None,
        phasors,
        frequency: Some(FrequencyDescriptor::default()),
        analogs,
        digitals: vec![DigitalDescriptor {
            label: format!("{} BREAKERS", acronym),
            mask_value: 0,
        }],
        is_virtual: false,
    }
}

pub fn random_base_configuration(
    id_code: u16,
    frame_rate: u16,
    device_count: usize,
) -> BaseConfigurationFrame {
    let mut rng = rand::rng();
    BaseConfigurationFrame {
        id_code,
        frame_rate,
        devices: (0..device_count)
            .map(|index| random_device(index, &mut rng))
            .collect(),
    }
}

/// Produces one measurement for every value of every cell of `configuration`.
///
/// Magnitudes sit near nominal, angles are sequential three-phase values with jitter,
/// frequency wanders a few mHz around nominal and all devices report good status.
pub fn simulated_measurements<R: Rng>(
    configuration: &ConfigurationFrame,
    timestamp: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Measurement> {
    let mut measurements = Vec::new();
    let mut push = |cell_index, kind, index, value| {
        measurements.push(Measurement::new(
            SignalReference::new(cell_index, kind, index),
            timestamp,
            value,
        ));
    };

    for (cell_index, cell) in configuration.cells.iter().enumerate() {
        for (index, phasor) in cell.phasors.iter().enumerate() {
            let nominal = match phasor.phasor_type {
                PhasorType::Voltage => NOMINAL_VOLTAGE,
                PhasorType::Current => NOMINAL_CURRENT,
            };
            let magnitude = nominal * rng.random_range(0.98..1.02);
            let angle = -120.0 * (index % 3) as f64 + rng.random_range(-2.0..2.0);
            push(cell_index, SignalKind::Magnitude, index, magnitude);
            push(cell_index, SignalKind::Angle, index, angle);
        }
        let frequency = cell.nominal_frequency.hz() + rng.random_range(-0.01..0.01);
        push(cell_index, SignalKind::Frequency, 0, frequency);
        push(cell_index, SignalKind::DfDt, 0, rng.random_range(-0.05..0.05));
        for index in 0..cell.analogs.len() {
            push(cell_index, SignalKind::Analog, index, rng.random_range(0.0..100.0));
        }
        for index in 0..cell.digitals.len() {
            push(cell_index, SignalKind::Digital, index, rng.random_range(0..=0xFFu16) as f64);
        }
        push(cell_index, SignalKind::Status, 0, 0.0);
    }
    measurements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concentrator::builder::{build_configuration_frame, BuildOptions};
    use crate::concentrator::settings::ConcentratorSettings;

    #[test]
    fn test_random_devices_build() {
        let base = random_base_configuration(235, 30, 12);
        let options = BuildOptions::from_settings(&ConcentratorSettings::new(235), Utc::now());
        let build = build_configuration_frame(&base, &options);
        assert!(build.failures.is_empty());
        assert_eq!(build.frame.cells.len(), 12);
        assert_eq!(build.frame.cells[11].id_code, 1011);
        assert_eq!(build.frame.cells[0].phasors.len(), 4);
    }

    #[test]
    fn test_measurements_cover_every_value() {
        let base = random_base_configuration(235, 30, 3);
        let options = BuildOptions::from_settings(&ConcentratorSettings::new(235), Utc::now());
        let frame = build_configuration_frame(&base, &options).frame;
        let measurements = simulated_measurements(&frame, Utc::now(), &mut rand::rng());
        let values: usize = frame.cells.iter().map(|cell| cell.value_count() + 1).sum();
        assert_eq!(measurements.len(), values);
    }
}
