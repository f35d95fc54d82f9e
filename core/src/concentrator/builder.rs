//! # Configuration Frame Builder
//!
//! Turns a `BaseConfigurationFrame` into a C37.118 `ConfigurationFrame`.
//!
//! ## Key Components
//!
//! - `BuildOptions`: Protocol choices and fallback values, usually taken from
//!   `ConcentratorSettings`.
//! - `build_configuration_frame`: Builds one cell per valid device. Devices that cannot
//!   be expressed are left out and reported as `CellBuildFailure`s, so one bad device
//!   never blocks the others.

use chrono::{DateTime, Utc};

use super::descriptor::{BaseConfigurationFrame, DeviceDescriptor};
use super::settings::ConcentratorSettings;
use crate::ieee_c37_118::common::{FrameType, Version};
use crate::ieee_c37_118::config::{
    AnalogDefinition, ConfigurationCell, ConfigurationFrame, DigitalDefinition,
    FrequencyDefinition, PhasorDefinition, LABEL_LENGTH,
};
use crate::ieee_c37_118::flags::{CoordinateFormat, DataFormat, FormatFlags};
use crate::ieee_c37_118::units::{NominalFrequency, PhasorType};

/// Characters of the ID label kept in a derived frequency label, leaving room for
/// the `" Freq"` suffix.
const FREQUENCY_LABEL_PREFIX_LENGTH: usize = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub version: Version,
    pub time_base: u32,
    pub data_format: DataFormat,
    pub coordinate_format: CoordinateFormat,
    pub nominal_frequency: NominalFrequency,
    pub current_scaling_value: u32,
    pub voltage_scaling_value: u32,
    pub analog_scaling_value: u32,
    pub digital_mask_value: u32,
    pub timestamp: DateTime<Utc>,
}

impl BuildOptions {
    pub fn from_settings(settings: &ConcentratorSettings, timestamp: DateTime<Utc>) -> Self {
        BuildOptions {
            version: settings.target_configuration_type,
            time_base: settings.time_base,
            data_format: settings.data_format,
            coordinate_format: settings.coordinate_format,
            nominal_frequency: settings.nominal_frequency,
            current_scaling_value: settings.current_scaling_value,
            voltage_scaling_value: settings.voltage_scaling_value,
            analog_scaling_value: settings.analog_scaling_value,
            digital_mask_value: settings.digital_mask_value,
            timestamp,
        }
    }
}

/// A device that could not be turned into a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellBuildFailure {
    pub device: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ConfigurationBuild {
    pub frame: ConfigurationFrame,
    pub failures: Vec<CellBuildFailure>,
}

/// Builds a CFG-2 frame from `base`.
///
/// # Parameters
///
/// * `base`: Stream ID code, frame rate and devices in publication order.
/// * `options`: Protocol version, formats and fallback scaling values.
///
/// # Returns
///
/// The frame with one cell per accepted device, in input order, plus a failure entry
/// for every rejected device. Cells carry revision count 0.
pub fn build_configuration_frame(
    base: &BaseConfigurationFrame,
    options: &BuildOptions,
) -> ConfigurationBuild {
    let mut cells = Vec::with_capacity(base.devices.len());
    let mut failures = Vec::new();

    for device in &base.devices {
        match build_cell(device, options) {
            Ok(cell) => cells.push(cell),
            Err(message) => failures.push(CellBuildFailure {
                device: device_name(device),
                message,
            }),
        }
    }

    let frame = ConfigurationFrame {
        frame_type: FrameType::Config2,
        version: options.version,
        id_code: base.id_code,
        timestamp: options.timestamp,
        time_base: options.time_base,
        frame_rate: i16::try_from(base.frame_rate).unwrap_or(i16::MAX),
        cells,
    };
    ConfigurationBuild { frame, failures }
}

fn device_name(device: &DeviceDescriptor) -> String {
    if device.id_label.trim().is_empty() {
        device.station_name.clone()
    } else {
        device.id_label.clone()
    }
}

fn truncate(label: &str, length: usize) -> String {
    label.chars().take(length).collect()
}

fn validate_station_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Station name is empty".to_string());
    }
    if !name.is_ascii() {
        return Err(format!("Station name \"{}\" contains non-ASCII characters", name));
    }
    if name.len() > LABEL_LENGTH {
        return Err(format!(
            "Station name \"{}\" is longer than {} characters",
            name, LABEL_LENGTH
        ));
    }
    Ok(())
}

fn build_cell(
    device: &DeviceDescriptor,
    options: &BuildOptions,
) -> Result<ConfigurationCell, String> {
    validate_station_name(&device.station_name)?;
    let frequency = device
        .frequency
        .as_ref()
        .ok_or_else(|| "Device has no frequency definition".to_string())?;

    let data_format = device.data_format.unwrap_or(options.data_format);
    let coordinate_format = device.coordinate_format.unwrap_or(options.coordinate_format);
    let format = FormatFlags::new(data_format, coordinate_format, data_format, data_format);

    let phasors = device
        .phasors
        .iter()
        .map(|phasor| PhasorDefinition {
            label: truncate(&phasor.label, LABEL_LENGTH),
            phasor_type: phasor.phasor_type,
            scaling_value: match (phasor.scaling_value, phasor.phasor_type) {
                (0, PhasorType::Voltage) => options.voltage_scaling_value,
                (0, PhasorType::Current) => options.current_scaling_value,
                (value, _) => value,
            },
            offset: phasor.offset,
        })
        .collect();

    let frequency_label = if frequency.label.trim().is_empty() {
        format!(
            "{} Freq",
            truncate(&device.id_label, FREQUENCY_LABEL_PREFIX_LENGTH)
        )
        .trim()
        .to_string()
    } else {
        truncate(&frequency.label, LABEL_LENGTH)
    };

    let analogs = device
        .analogs
        .iter()
        .map(|analog| AnalogDefinition {
            label: truncate(&analog.label, LABEL_LENGTH),
            analog_type: analog.analog_type,
            scaling_value: if analog.scaling_value == 0 {
                options.analog_scaling_value as i32
            } else {
                analog.scaling_value
            },
            offset: analog.offset,
        })
        .collect();

    let digitals = device
        .digitals
        .iter()
        .map(|digital| {
            let mask = if digital.mask_value == 0 {
                options.digital_mask_value
            } else {
                digital.mask_value
            };
            DigitalDefinition::from_label(&digital.label, mask)
        })
        .collect();

    Ok(ConfigurationCell {
        station_name: device.station_name.clone(),
        id_label: device.id_label.clone(),
        id_code: device.id_code,
        format,
        phasors,
        frequency: FrequencyDefinition {
            label: frequency_label,
            offset: frequency.offset,
        },
        analogs,
        digitals,
        nominal_frequency: device.nominal_frequency.unwrap_or(options.nominal_frequency),
        revision_count: 0,
        is_virtual: device.is_virtual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concentrator::descriptor::{
        AnalogDescriptor, DigitalDescriptor, FrequencyDescriptor, PhasorDescriptor,
    };
    use crate::ieee_c37_118::units::AnalogType;

    fn options() -> BuildOptions {
        BuildOptions::from_settings(&ConcentratorSettings::new(235), Utc::now())
    }

    fn device(id_code: u16, station_name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            id_code,
            station_name: station_name.to_string(),
            id_label: "SHELBY-PMU-01".to_string(),
            nominal_frequency: None,
            data_format: None,
            coordinate_format: None,
            phasors: Vec::new(),
            frequency: Some(FrequencyDescriptor::default()),
            analogs: Vec::new(),
            digitals: Vec::new(),
            is_virtual: false,
        }
    }

    fn base(devices: Vec<DeviceDescriptor>) -> BaseConfigurationFrame {
        BaseConfigurationFrame {
            id_code: 235,
            frame_rate: 30,
            devices,
        }
    }

    #[test]
    fn test_phasors_keep_input_order() {
        let mut shelby = device(1, "SHELBY");
        shelby.phasors = (0..5)
            .map(|index| PhasorDescriptor {
                label: format!("PHASOR {}", index),
                phasor_type: if index % 2 == 0 {
                    PhasorType::Voltage
                } else {
                    PhasorType::Current
                },
                scaling_value: 0,
                offset: 0.0,
            })
            .collect();
        let build = build_configuration_frame(&base(vec![shelby]), &options());
        assert!(build.failures.is_empty());
        let cell = &build.frame.cells[0];
        assert_eq!(cell.phasors.len(), 5);
        for (index, phasor) in cell.phasors.iter().enumerate() {
            assert_eq!(phasor.label, format!("PHASOR {}", index));
        }
        assert_eq!(cell.phasors[0].scaling_value, 2_725_785);
        assert_eq!(cell.phasors[1].scaling_value, 2423);
    }

    #[test]
    fn test_labels_and_fallbacks() {
        let mut shelby = device(1, "SHELBY");
        shelby.phasors.push(PhasorDescriptor {
            label: "A VERY LONG PHASOR LABEL".to_string(),
            phasor_type: PhasorType::Voltage,
            scaling_value: 915_527,
            offset: 1.5,
        });
        shelby.analogs.push(AnalogDescriptor {
            label: "MW".to_string(),
            analog_type: AnalogType::RmsOfAnalogInput,
            scaling_value: 0,
            offset: 0.0,
        });
        shelby.digitals.push(DigitalDescriptor {
            label: "BREAKER".to_string(),
            mask_value: 0,
        });
        let build = build_configuration_frame(&base(vec![shelby]), &options());
        let cell = &build.frame.cells[0];
        assert_eq!(cell.phasors[0].label, "A VERY LONG PHAS");
        assert_eq!(cell.phasors[0].scaling_value, 915_527);
        assert_eq!(cell.phasors[0].offset, 1.5);
        assert_eq!(cell.frequency.label, "SHELBY-PMU- Freq");
        assert_eq!(cell.analogs[0].scaling_value, 1_373_291);
        assert_eq!(cell.digitals[0].units.normal_status, 0x0000);
        assert_eq!(cell.digitals[0].units.valid_inputs, 0xFFFF);
        assert_eq!(build.frame.frame_type, FrameType::Config2);
        assert_eq!(build.frame.frame_rate, 30);
    }

    #[test]
    fn test_bad_devices_are_isolated() {
        let mut no_frequency = device(2, "NOFREQ");
        no_frequency.frequency = None;
        no_frequency.id_label = "NOFREQ".to_string();
        let devices = vec![
            device(1, "GOOD ONE"),
            no_frequency,
            device(3, "THIS NAME IS FAR TOO LONG"),
            device(4, ""),
            device(5, "GOOD TWO"),
        ];
        let build = build_configuration_frame(&base(devices), &options());
        let ids: Vec<u16> = build.frame.cells.iter().map(|cell| cell.id_code).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(build.failures.len(), 3);
        assert_eq!(build.failures[0].device, "NOFREQ");
    }

    #[test]
    fn test_device_format_overrides() {
        let mut shelby = device(1, "SHELBY");
        shelby.data_format = Some(DataFormat::FixedInteger);
        shelby.coordinate_format = Some(CoordinateFormat::Rectangular);
        shelby.nominal_frequency = Some(NominalFrequency::Hz50);
        shelby.is_virtual = true;
        let build = build_configuration_frame(&base(vec![shelby]), &options());
        let cell = &build.frame.cells[0];
        assert_eq!(cell.format.raw(), 0x0000);
        assert_eq!(cell.nominal_frequency, NominalFrequency::Hz50);
        assert!(cell.is_virtual);
    }
}
