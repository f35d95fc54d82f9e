//! Protocol independent description of the devices a concentrator publishes.
//!
//! Descriptors are what a host application (or a JSON device file) provides. The
//! builder turns them into C37.118 configuration cells, filling protocol details such as
//! scaling values from the concentrator settings.

use serde::{Deserialize, Serialize};

use crate::ieee_c37_118::flags::{CoordinateFormat, DataFormat};
use crate::ieee_c37_118::units::{AnalogType, NominalFrequency, PhasorType};

/// One phasor channel. A `scaling_value` of 0 selects the default for its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorDescriptor {
    pub label: String,
    #[serde(default)]
    pub phasor_type: PhasorType,
    #[serde(default)]
    pub scaling_value: u32,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDescriptor {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogDescriptor {
    pub label: String,
    #[serde(default)]
    pub analog_type: AnalogType,
    #[serde(default)]
    pub scaling_value: i32,
    #[serde(default)]
    pub offset: f64,
}

/// One digital status word. `label` is either a single name or 16 names joined by `|`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalDescriptor {
    pub label: String,
    #[serde(default)]
    pub mask_value: u32,
}

/// One output stream device.
///
/// # Fields
///
/// * `id_code`: Device ID code written to the cell.
/// * `station_name`: At most 16 ASCII characters.
/// * `id_label`: Short acronym used to derive the frequency label.
/// * `nominal_frequency`, `data_format`, `coordinate_format`: Per-device overrides of
///   the concentrator settings.
/// * `frequency`: Required. A device without one is not published.
/// * `is_virtual`: Virtual devices always report a zero STAT word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id_code: u16,
    pub station_name: String,
    #[serde(default)]
    pub id_label: String,
    #[serde(default)]
    pub nominal_frequency: Option<NominalFrequency>,
    #[serde(default)]
    pub data_format: Option<DataFormat>,
    #[serde(default)]
    pub coordinate_format: Option<CoordinateFormat>,
    #[serde(default)]
    pub phasors: Vec<PhasorDescriptor>,
    #[serde(default)]
    pub frequency: Option<FrequencyDescriptor>,
    #[serde(default)]
    pub analogs: Vec<AnalogDescriptor>,
    #[serde(default)]
    pub digitals: Vec<DigitalDescriptor>,
    #[serde(default)]
    pub is_virtual: bool,
}

/// The complete set of devices to publish in one configuration frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseConfigurationFrame {
    pub id_code: u16,
    pub frame_rate: u16,
    pub devices: Vec<DeviceDescriptor>,
}
