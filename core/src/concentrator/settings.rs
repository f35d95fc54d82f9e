//! # Concentrator Settings
//!
//! The concentrator is configured from a flat, case-insensitive key/value map, usually
//! parsed from a connection string such as
//! `IDCode=235; commandChannel={port=4712}; FramesPerSecond=30`.
//!
//! ## Key Components
//!
//! - `parse_key_value_pairs`: Splits a connection string into a map. Values wrapped in
//!   braces may contain separators and nested braces.
//! - `ConcentratorSettings`: Typed settings with defaults, built by `from_settings`.

use std::collections::HashMap;

use crate::error::{ConcentratorError, Result};
use crate::ieee_c37_118::common::Version;
use crate::ieee_c37_118::flags::{CoordinateFormat, DataFormat};
use crate::ieee_c37_118::units::NominalFrequency;

pub const DEFAULT_TIME_BASE: u32 = 16_777_215;
pub const DEFAULT_FRAMES_PER_SECOND: u16 = 30;
pub const DEFAULT_LAG_TIME: f64 = 3.0;
pub const DEFAULT_LEAD_TIME: f64 = 1.0;
pub const DEFAULT_CURRENT_SCALING_VALUE: u32 = 2423;
pub const DEFAULT_VOLTAGE_SCALING_VALUE: u32 = 2_725_785;
pub const DEFAULT_ANALOG_SCALING_VALUE: u32 = 1_373_291;
pub const DEFAULT_DIGITAL_MASK_VALUE: u32 = 0xFFFF_0000;

/// Parses `key=value` pairs separated by `;`.
///
/// Keys are trimmed and lower-cased. A value enclosed in `{...}` is taken verbatim
/// (without the outer braces) and may itself contain `;`, `=` and balanced braces.
///
/// # Returns
///
/// * `Err(ConcentratorError::InvalidSetting)`: For a pair without `=`, an empty key or
///   unbalanced braces.
pub fn parse_key_value_pairs(connection_string: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in connection_string.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                if depth == 0 {
                    return Err(ConcentratorError::InvalidSetting {
                        key: current.trim().to_string(),
                        message: "unbalanced '}'".to_string(),
                    });
                }
                depth -= 1;
                current.push(ch);
            }
            ';' if depth == 0 => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(ConcentratorError::InvalidSetting {
            key: current.trim().to_string(),
            message: "missing '}'".to_string(),
        });
    }
    segments.push(current);

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = segment.split_once('=') else {
            return Err(ConcentratorError::InvalidSetting {
                key: segment.to_string(),
                message: "expected key=value".to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConcentratorError::InvalidSetting {
                key: segment.to_string(),
                message: "empty key".to_string(),
            });
        }
        let mut value = value.trim();
        if value.starts_with('{') && value.ends_with('}') && value.len() >= 2 {
            value = &value[1..value.len() - 1];
        }
        pairs.insert(key.to_ascii_lowercase(), value.to_string());
    }
    Ok(pairs)
}

/// Typed concentrator settings.
///
/// # Fields
///
/// * `id_code`: Stream ID code of every frame the concentrator sends.
/// * `data_channel`, `command_channel`: Channel definitions; at least one is present.
/// * `time_base`: FRACSEC resolution.
/// * `validate_id_code`: Reject commands addressed to another ID code.
/// * `target_configuration_type`: Protocol revision written to SYNC.
/// * `auto_publish_config_frame`: Broadcast the configuration frame at the top of each
///   minute.
/// * `auto_start_data_channel`: Stream from start-up and ignore start/stop commands.
/// * `frames_per_second`, `lag_time`, `lead_time`: Publication rate and sorting window
///   in seconds.
/// * `*_scaling_value`, `digital_mask_value`: Fallbacks for descriptors that leave
///   scaling or mask at zero.
/// * `process_data_valid_flag`: Flag cells missing values as invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentratorSettings {
    pub id_code: u16,
    pub data_channel: Option<String>,
    pub command_channel: Option<String>,
    pub time_base: u32,
    pub validate_id_code: bool,
    pub target_configuration_type: Version,
    pub auto_publish_config_frame: bool,
    pub auto_start_data_channel: bool,
    pub nominal_frequency: NominalFrequency,
    pub frames_per_second: u16,
    pub lag_time: f64,
    pub lead_time: f64,
    pub data_format: DataFormat,
    pub coordinate_format: CoordinateFormat,
    pub current_scaling_value: u32,
    pub voltage_scaling_value: u32,
    pub analog_scaling_value: u32,
    pub digital_mask_value: u32,
    pub process_data_valid_flag: bool,
    pub allow_sorts_by_arrival: bool,
    pub perform_timestamp_reasonability_check: bool,
}

impl ConcentratorSettings {
    /// Defaults for a concentrator that only has a command channel.
    pub fn new(id_code: u16) -> Self {
        ConcentratorSettings {
            id_code,
            data_channel: None,
            command_channel: Some(String::new()),
            time_base: DEFAULT_TIME_BASE,
            validate_id_code: false,
            target_configuration_type: Version::V2005,
            auto_publish_config_frame: false,
            auto_start_data_channel: true,
            nominal_frequency: NominalFrequency::Hz60,
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            lag_time: DEFAULT_LAG_TIME,
            lead_time: DEFAULT_LEAD_TIME,
            data_format: DataFormat::FloatingPoint,
            coordinate_format: CoordinateFormat::Polar,
            current_scaling_value: DEFAULT_CURRENT_SCALING_VALUE,
            voltage_scaling_value: DEFAULT_VOLTAGE_SCALING_VALUE,
            analog_scaling_value: DEFAULT_ANALOG_SCALING_VALUE,
            digital_mask_value: DEFAULT_DIGITAL_MASK_VALUE,
            process_data_valid_flag: true,
            allow_sorts_by_arrival: true,
            perform_timestamp_reasonability_check: true,
        }
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        Self::from_settings(&parse_key_value_pairs(connection_string)?)
    }

    /// Builds settings from a key/value map. Key lookup ignores case.
    ///
    /// # Returns
    ///
    /// * `Err(ConcentratorError::MissingSetting)`: If `IDCode` is absent, or neither
    ///   `dataChannel` nor `commandChannel` is present.
    /// * `Err(ConcentratorError::InvalidSetting)`: If a value cannot be parsed or is out
    ///   of range.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let map: HashMap<String, &str> = settings
            .iter()
            .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim()))
            .collect();
        let get = |key: &str| map.get(&key.to_ascii_lowercase()).copied();

        let id_code = match get("IDCode") {
            Some(value) => parse_number::<u16>("IDCode", value)?,
            None => return Err(ConcentratorError::MissingSetting("IDCode".to_string())),
        };

        let data_channel = get("dataChannel").map(str::to_string);
        let command_channel = get("commandChannel").map(str::to_string);
        if data_channel.is_none() && command_channel.is_none() {
            return Err(ConcentratorError::MissingSetting(
                "dataChannel or commandChannel".to_string(),
            ));
        }

        let mut settings = ConcentratorSettings::new(id_code);
        settings.data_channel = data_channel;
        settings.auto_publish_config_frame = command_channel.is_none();
        settings.command_channel = command_channel;

        if let Some(value) = get("TimeBase") {
            let time_base = parse_number::<u32>("TimeBase", value)?;
            if time_base == 0 || time_base > 0x00FF_FFFF {
                return Err(invalid("TimeBase", "must be between 1 and 16777215"));
            }
            settings.time_base = time_base;
        }
        if let Some(value) = get("ValidateIDCode") {
            settings.validate_id_code = parse_bool("ValidateIDCode", value)?;
        }
        if let Some(value) = get("TargetConfigurationType") {
            settings.target_configuration_type = Version::from_string(value)
                .map_err(|e| invalid("TargetConfigurationType", &e.to_string()))?;
        }
        if let Some(value) = get("autoPublishConfigFrame") {
            settings.auto_publish_config_frame = parse_bool("autoPublishConfigFrame", value)?;
        }
        if let Some(value) = get("autoStartDataChannel") {
            settings.auto_start_data_channel = parse_bool("autoStartDataChannel", value)?;
        }
        if let Some(value) = get("nominalFrequency") {
            let hz = parse_number::<u32>("nominalFrequency", value)?;
            settings.nominal_frequency = NominalFrequency::from_hz(hz)
                .map_err(|e| invalid("nominalFrequency", &e.to_string()))?;
        }
        if let Some(value) = get("FramesPerSecond") {
            let fps = parse_number::<u16>("FramesPerSecond", value)?;
            if fps == 0 || fps > i16::MAX as u16 {
                return Err(invalid("FramesPerSecond", "must be between 1 and 32767"));
            }
            settings.frames_per_second = fps;
        }
        if let Some(value) = get("LagTime") {
            settings.lag_time = parse_seconds("LagTime", value)?;
        }
        if let Some(value) = get("LeadTime") {
            settings.lead_time = parse_seconds("LeadTime", value)?;
        }
        if let Some(value) = get("dataFormat") {
            settings.data_format = parse_data_format(value)?;
        }
        if let Some(value) = get("coordinateFormat") {
            settings.coordinate_format = parse_coordinate_format(value)?;
        }
        if let Some(value) = get("currentScalingValue") {
            settings.current_scaling_value = parse_bit_pattern("currentScalingValue", value)?;
        }
        if let Some(value) = get("voltageScalingValue") {
            settings.voltage_scaling_value = parse_bit_pattern("voltageScalingValue", value)?;
        }
        if let Some(value) = get("analogScalingValue") {
            settings.analog_scaling_value = parse_bit_pattern("analogScalingValue", value)?;
        }
        if let Some(value) = get("digitalMaskValue") {
            settings.digital_mask_value = parse_bit_pattern("digitalMaskValue", value)?;
        }
        if let Some(value) = get("processDataValidFlag") {
            settings.process_data_valid_flag = parse_bool("processDataValidFlag", value)?;
        }
        if let Some(value) = get("allowSortsByArrival") {
            settings.allow_sorts_by_arrival = parse_bool("allowSortsByArrival", value)?;
        }
        if let Some(value) = get("performTimestampReasonabilityCheck") {
            settings.perform_timestamp_reasonability_check =
                parse_bool("performTimestampReasonabilityCheck", value)?;
        }

        Ok(settings)
    }
}

fn invalid(key: &str, message: &str) -> ConcentratorError {
    ConcentratorError::InvalidSetting {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| invalid(key, &format!("\"{}\": {}", value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, &format!("\"{}\" is not a boolean", value))),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<f64> {
    let seconds = parse_number::<f64>(key, value)?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid(key, "must be a positive number of seconds"));
    }
    Ok(seconds)
}

/// Accepts unsigned, negative (kept as their two's complement bit pattern) and `0x`
/// prefixed hexadecimal values.
fn parse_bit_pattern(key: &str, value: &str) -> Result<u32> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map_err(|e| invalid(key, &format!("\"{}\": {}", value, e)));
    }
    if let Ok(unsigned) = value.parse::<u32>() {
        return Ok(unsigned);
    }
    parse_number::<i32>(key, value).map(|signed| signed as u32)
}

fn parse_data_format(value: &str) -> Result<DataFormat> {
    match value.to_ascii_lowercase().as_str() {
        "floatingpoint" | "float" => Ok(DataFormat::FloatingPoint),
        "fixedinteger" | "integer" => Ok(DataFormat::FixedInteger),
        _ => Err(invalid(
            "dataFormat",
            &format!("\"{}\" - use FloatingPoint or FixedInteger", value),
        )),
    }
}

fn parse_coordinate_format(value: &str) -> Result<CoordinateFormat> {
    match value.to_ascii_lowercase().as_str() {
        "polar" => Ok(CoordinateFormat::Polar),
        "rectangular" => Ok(CoordinateFormat::Rectangular),
        _ => Err(invalid(
            "coordinateFormat",
            &format!("\"{}\" - use Polar or Rectangular", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_values() {
        let pairs =
            parse_key_value_pairs("IDCode=235; commandChannel={port=4712; interface={0.0.0.0}};")
                .unwrap();
        assert_eq!(pairs["idcode"], "235");
        assert_eq!(pairs["commandchannel"], "port=4712; interface={0.0.0.0}");

        assert!(parse_key_value_pairs("IDCode=1; dataChannel={port=1").is_err());
        assert!(parse_key_value_pairs("IDCode").is_err());
    }

    #[test]
    fn test_defaults_with_command_channel() {
        let settings =
            ConcentratorSettings::from_connection_string("idcode=235; commandChannel={port=4712}")
                .unwrap();
        assert_eq!(settings.id_code, 235);
        assert_eq!(settings.time_base, DEFAULT_TIME_BASE);
        assert_eq!(settings.frames_per_second, 30);
        assert!(!settings.auto_publish_config_frame);
        assert!(settings.auto_start_data_channel);
        assert!(!settings.validate_id_code);
        assert_eq!(settings.target_configuration_type, Version::V2005);
        assert_eq!(settings.nominal_frequency, NominalFrequency::Hz60);
        assert_eq!(settings.digital_mask_value, 0xFFFF_0000);
        assert!(settings.process_data_valid_flag);
    }

    #[test]
    fn test_auto_publish_defaults_on_without_command_channel() {
        let settings =
            ConcentratorSettings::from_connection_string("IDCode=1; dataChannel={port=4713}")
                .unwrap();
        assert!(settings.auto_publish_config_frame);

        let explicit = ConcentratorSettings::from_connection_string(
            "IDCode=1; dataChannel={port=4713}; autoPublishConfigFrame=off",
        )
        .unwrap();
        assert!(!explicit.auto_publish_config_frame);
    }

    #[test]
    fn test_required_settings() {
        assert!(matches!(
            ConcentratorSettings::from_connection_string("commandChannel={port=4712}"),
            Err(ConcentratorError::MissingSetting(key)) if key == "IDCode"
        ));
        assert!(matches!(
            ConcentratorSettings::from_connection_string("IDCode=1"),
            Err(ConcentratorError::MissingSetting(_))
        ));
    }

    #[test]
    fn test_typed_values() {
        let settings = ConcentratorSettings::from_connection_string(
            "IDCode=1; commandChannel={}; voltageScalingValue=-1; digitalMaskValue=0x0000FFFF; \
             dataFormat=FixedInteger; coordinateFormat=rectangular; nominalFrequency=50; \
             TargetConfigurationType=Std2011; ValidateIDCode=Yes; LagTime=0.5",
        )
        .unwrap();
        assert_eq!(settings.voltage_scaling_value, 0xFFFF_FFFF);
        assert_eq!(settings.digital_mask_value, 0x0000_FFFF);
        assert_eq!(settings.data_format, DataFormat::FixedInteger);
        assert_eq!(settings.coordinate_format, CoordinateFormat::Rectangular);
        assert_eq!(settings.nominal_frequency, NominalFrequency::Hz50);
        assert_eq!(settings.target_configuration_type, Version::V2011);
        assert!(settings.validate_id_code);
        assert_eq!(settings.lag_time, 0.5);
    }

    #[test]
    fn test_rejects_bad_values() {
        for bad in [
            "IDCode=70000; commandChannel={}",
            "IDCode=1; commandChannel={}; TimeBase=0",
            "IDCode=1; commandChannel={}; nominalFrequency=55",
            "IDCode=1; commandChannel={}; ValidateIDCode=maybe",
            "IDCode=1; commandChannel={}; LeadTime=-1",
            "IDCode=1; commandChannel={}; dataFormat=Decimal",
        ] {
            assert!(
                matches!(
                    ConcentratorSettings::from_connection_string(bad),
                    Err(ConcentratorError::InvalidSetting { .. })
                ),
                "accepted {}",
                bad
            );
        }
    }
}
