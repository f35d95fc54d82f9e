//! # IEEE C37.118 Bit-Field Codecs
//!
//! Status, format and time quality information travels as packed 16 and 32 bit words.
//! This module names every sub-field of those words and provides masked get/set access
//! so that touching one field never disturbs its neighbours.
//!
//! ## Key Components
//!
//! - `BitField`: A mask plus shift over an unsigned word.
//! - `StatusFlags`: The 16-bit STAT word carried by every data cell.
//! - `StatusUpdate`: Tagged update applied to a `StatusFlags` word. Cross-field side
//!   effects (sync-locked clears the synchronization error) live here.
//! - `FormatFlags`: The 16-bit FORMAT word of a configuration cell.
//! - `TimeQualityFlags` and `TimeQualityIndicatorCode`: The upper byte of FRACSEC.
//!
//! ## Usage
//!
//! Data cells hold a `StatusFlags` and change it only through `apply`. Configuration
//! cells derive their encoded value sizes from `FormatFlags`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not, Shl, Shr};

/// Unsigned word types that bit fields can be laid over.
pub trait FlagWord:
    Copy
    + PartialEq
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
}

impl FlagWord for u16 {}
impl FlagWord for u32 {}

/// A named field inside a packed word: the bits selected by `mask`, read and written
/// `shift` positions from bit zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField<T> {
    pub mask: T,
    pub shift: u32,
}

impl<T: FlagWord> BitField<T> {
    pub const fn new(mask: T, shift: u32) -> Self {
        BitField { mask, shift }
    }

    /// Returns the field value, shifted down to bit zero.
    pub fn get(&self, word: T) -> T {
        (word & self.mask) >> self.shift
    }

    /// Returns `word` with only this field replaced by `value`.
    ///
    /// Bits of `value` that do not fit in the field are dropped.
    pub fn set(&self, word: T, value: T) -> T {
        (word & !self.mask) | ((value << self.shift) & self.mask)
    }
}

/// Two-bit unlocked time code held in STAT bits 5-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockedTime {
    SyncLocked,
    UnlockedFor10Seconds,
    UnlockedFor100Seconds,
    UnlockedForOver1000Seconds,
}

impl UnlockedTime {
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => UnlockedTime::SyncLocked,
            1 => UnlockedTime::UnlockedFor10Seconds,
            2 => UnlockedTime::UnlockedFor100Seconds,
            _ => UnlockedTime::UnlockedForOver1000Seconds,
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            UnlockedTime::SyncLocked => 0,
            UnlockedTime::UnlockedFor10Seconds => 1,
            UnlockedTime::UnlockedFor100Seconds => 2,
            UnlockedTime::UnlockedForOver1000Seconds => 3,
        }
    }
}

/// Four-bit trigger reason code held in STAT bits 3-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    Manual,
    MagnitudeLow,
    MagnitudeHigh,
    PhaseAngleDifference,
    FrequencyHighOrLow,
    DfDtHigh,
    Reserved,
    Digital,
    /// User defined codes 8 through 15, stored as 1 through 8.
    UserDefined(u8),
}

impl TriggerReason {
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0xF {
            0 => TriggerReason::Manual,
            1 => TriggerReason::MagnitudeLow,
            2 => TriggerReason::MagnitudeHigh,
            3 => TriggerReason::PhaseAngleDifference,
            4 => TriggerReason::FrequencyHighOrLow,
            5 => TriggerReason::DfDtHigh,
            6 => TriggerReason::Reserved,
            7 => TriggerReason::Digital,
            code => TriggerReason::UserDefined((code - 7) as u8),
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            TriggerReason::Manual => 0,
            TriggerReason::MagnitudeLow => 1,
            TriggerReason::MagnitudeHigh => 2,
            TriggerReason::PhaseAngleDifference => 3,
            TriggerReason::FrequencyHighOrLow => 4,
            TriggerReason::DfDtHigh => 5,
            TriggerReason::Reserved => 6,
            TriggerReason::Digital => 7,
            TriggerReason::UserDefined(n) => (7 + (*n).clamp(1, 8)) as u16,
        }
    }
}

/// How a data cell was placed in its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSortingType {
    ByTimestamp,
    ByArrival,
}

/// A single change to a `StatusFlags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    DataValid(bool),
    DeviceError(bool),
    Synchronized(bool),
    SortingType(DataSortingType),
    TriggerDetected(bool),
    ConfigurationChanged(bool),
    DataModified(bool),
    /// Setting `SyncLocked` also marks the device as synchronized.
    UnlockedTime(UnlockedTime),
    TriggerReason(TriggerReason),
}

/// The 16-bit STAT word of a data cell.
///
/// Bit 15 is set when data is NOT valid; an all-zero word means good data, synchronized,
/// sorted by timestamp with no trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct StatusFlags(u16);

impl StatusFlags {
    pub const DATA_IS_VALID: u16 = 0x8000;
    pub const DEVICE_ERROR: u16 = 0x4000;
    pub const DEVICE_SYNCHRONIZATION_ERROR: u16 = 0x2000;
    pub const DATA_SORTING_TYPE: u16 = 0x1000;
    pub const DEVICE_TRIGGER_DETECTED: u16 = 0x0800;
    pub const CONFIGURATION_CHANGED: u16 = 0x0400;
    /// Bit 9, inside the reserved region.
    pub const DATA_MODIFIED: u16 = 0x0200;

    pub const RESERVED: BitField<u16> = BitField::new(0x03C0, 6);
    pub const UNLOCKED_TIME: BitField<u16> = BitField::new(0x0030, 4);
    pub const TRIGGER_REASON: BitField<u16> = BitField::new(0x000F, 0);

    /// Every single-bit flag, in bit order.
    pub const FLAG_BITS: [u16; 7] = [
        Self::DATA_IS_VALID,
        Self::DEVICE_ERROR,
        Self::DEVICE_SYNCHRONIZATION_ERROR,
        Self::DATA_SORTING_TYPE,
        Self::DEVICE_TRIGGER_DETECTED,
        Self::CONFIGURATION_CHANGED,
        Self::DATA_MODIFIED,
    ];

    pub const fn from_raw(raw: u16) -> Self {
        StatusFlags(raw)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    pub fn get(&self, field: BitField<u16>) -> u16 {
        field.get(self.0)
    }

    pub fn set(self, field: BitField<u16>, value: u16) -> Self {
        StatusFlags(field.set(self.0, value))
    }

    pub fn contains(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    fn with_bit(self, bit: u16, on: bool) -> Self {
        if on {
            StatusFlags(self.0 | bit)
        } else {
            StatusFlags(self.0 & !bit)
        }
    }

    /// Applies one update and returns the resulting word.
    pub fn apply(self, update: StatusUpdate) -> Self {
        match update {
            StatusUpdate::DataValid(valid) => self.with_bit(Self::DATA_IS_VALID, !valid),
            StatusUpdate::DeviceError(error) => self.with_bit(Self::DEVICE_ERROR, error),
            StatusUpdate::Synchronized(synced) => {
                self.with_bit(Self::DEVICE_SYNCHRONIZATION_ERROR, !synced)
            }
            StatusUpdate::SortingType(sorting) => self.with_bit(
                Self::DATA_SORTING_TYPE,
                sorting == DataSortingType::ByArrival,
            ),
            StatusUpdate::TriggerDetected(on) => self.with_bit(Self::DEVICE_TRIGGER_DETECTED, on),
            StatusUpdate::ConfigurationChanged(on) => {
                self.with_bit(Self::CONFIGURATION_CHANGED, on)
            }
            StatusUpdate::DataModified(on) => self.with_bit(Self::DATA_MODIFIED, on),
            StatusUpdate::UnlockedTime(unlocked) => {
                let updated = self.set(Self::UNLOCKED_TIME, unlocked.bits());
                if unlocked == UnlockedTime::SyncLocked {
                    updated.with_bit(Self::DEVICE_SYNCHRONIZATION_ERROR, false)
                } else {
                    updated
                }
            }
            StatusUpdate::TriggerReason(reason) => self.set(Self::TRIGGER_REASON, reason.bits()),
        }
    }

    pub fn data_is_valid(&self) -> bool {
        !self.contains(Self::DATA_IS_VALID)
    }

    pub fn device_error(&self) -> bool {
        self.contains(Self::DEVICE_ERROR)
    }

    pub fn synchronization_is_valid(&self) -> bool {
        !self.contains(Self::DEVICE_SYNCHRONIZATION_ERROR)
    }

    pub fn data_sorting_type(&self) -> DataSortingType {
        if self.contains(Self::DATA_SORTING_TYPE) {
            DataSortingType::ByArrival
        } else {
            DataSortingType::ByTimestamp
        }
    }

    pub fn device_trigger_detected(&self) -> bool {
        self.contains(Self::DEVICE_TRIGGER_DETECTED)
    }

    pub fn configuration_changed(&self) -> bool {
        self.contains(Self::CONFIGURATION_CHANGED)
    }

    pub fn data_modified(&self) -> bool {
        self.contains(Self::DATA_MODIFIED)
    }

    pub fn unlocked_time(&self) -> UnlockedTime {
        UnlockedTime::from_bits(self.get(Self::UNLOCKED_TIME))
    }

    pub fn trigger_reason(&self) -> TriggerReason {
        TriggerReason::from_bits(self.get(Self::TRIGGER_REASON))
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Integer versus IEEE floating point encoding of a value class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataFormat {
    FixedInteger,
    #[default]
    FloatingPoint,
}

/// Phasor coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateFormat {
    Rectangular,
    #[default]
    Polar,
}

/// The 16-bit FORMAT word of a configuration cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatFlags(u16);

impl FormatFlags {
    pub const FREQUENCY: u16 = 0x0008;
    pub const ANALOG: u16 = 0x0004;
    pub const PHASORS: u16 = 0x0002;
    pub const COORDINATES: u16 = 0x0001;
    pub const UNUSED_MASK: u16 = 0xFFF0;

    pub const fn from_raw(raw: u16) -> Self {
        FormatFlags(raw)
    }

    /// Builds the word from the four per-class choices.
    pub fn new(
        phasor_format: DataFormat,
        coordinates: CoordinateFormat,
        frequency_format: DataFormat,
        analog_format: DataFormat,
    ) -> Self {
        let mut raw = 0;
        if frequency_format == DataFormat::FloatingPoint {
            raw |= Self::FREQUENCY;
        }
        if analog_format == DataFormat::FloatingPoint {
            raw |= Self::ANALOG;
        }
        if phasor_format == DataFormat::FloatingPoint {
            raw |= Self::PHASORS;
        }
        if coordinates == CoordinateFormat::Polar {
            raw |= Self::COORDINATES;
        }
        FormatFlags(raw)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    fn format_of(&self, bit: u16) -> DataFormat {
        if self.0 & bit != 0 {
            DataFormat::FloatingPoint
        } else {
            DataFormat::FixedInteger
        }
    }

    pub fn frequency_format(&self) -> DataFormat {
        self.format_of(Self::FREQUENCY)
    }

    pub fn analog_format(&self) -> DataFormat {
        self.format_of(Self::ANALOG)
    }

    pub fn phasor_format(&self) -> DataFormat {
        self.format_of(Self::PHASORS)
    }

    pub fn coordinate_format(&self) -> CoordinateFormat {
        if self.0 & Self::COORDINATES != 0 {
            CoordinateFormat::Polar
        } else {
            CoordinateFormat::Rectangular
        }
    }

    /// Bytes per FREQ and per DFREQ value.
    pub fn frequency_size(&self) -> usize {
        match self.frequency_format() {
            DataFormat::FloatingPoint => 4,
            DataFormat::FixedInteger => 2,
        }
    }

    pub fn analog_size(&self) -> usize {
        match self.analog_format() {
            DataFormat::FloatingPoint => 4,
            DataFormat::FixedInteger => 2,
        }
    }

    pub fn phasor_size(&self) -> usize {
        match self.phasor_format() {
            DataFormat::FloatingPoint => 8,
            DataFormat::FixedInteger => 4,
        }
    }
}

/// Time quality indicator code held in FRACSEC bits 27-24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeQualityIndicatorCode {
    Locked,
    UnlockedWithin1NanoSecond,
    UnlockedWithin10NanoSeconds,
    UnlockedWithin100NanoSeconds,
    UnlockedWithin1MicroSecond,
    UnlockedWithin10MicroSeconds,
    UnlockedWithin100MicroSeconds,
    UnlockedWithin1MilliSecond,
    UnlockedWithin10MilliSeconds,
    UnlockedWithin100MilliSeconds,
    UnlockedWithin1Second,
    UnlockedWithin10Seconds,
    Reserved(u8),
    Failure,
}

impl TimeQualityIndicatorCode {
    pub fn from_bits(bits: u32) -> Self {
        use TimeQualityIndicatorCode::*;
        match bits & 0xF {
            0x0 => Locked,
            0x1 => UnlockedWithin1NanoSecond,
            0x2 => UnlockedWithin10NanoSeconds,
            0x3 => UnlockedWithin100NanoSeconds,
            0x4 => UnlockedWithin1MicroSecond,
            0x5 => UnlockedWithin10MicroSeconds,
            0x6 => UnlockedWithin100MicroSeconds,
            0x7 => UnlockedWithin1MilliSecond,
            0x8 => UnlockedWithin10MilliSeconds,
            0x9 => UnlockedWithin100MilliSeconds,
            0xA => UnlockedWithin1Second,
            0xB => UnlockedWithin10Seconds,
            0xF => Failure,
            code => Reserved(code as u8),
        }
    }

    pub fn bits(&self) -> u32 {
        use TimeQualityIndicatorCode::*;
        match self {
            Locked => 0x0,
            UnlockedWithin1NanoSecond => 0x1,
            UnlockedWithin10NanoSeconds => 0x2,
            UnlockedWithin100NanoSeconds => 0x3,
            UnlockedWithin1MicroSecond => 0x4,
            UnlockedWithin10MicroSeconds => 0x5,
            UnlockedWithin100MicroSeconds => 0x6,
            UnlockedWithin1MilliSecond => 0x7,
            UnlockedWithin10MilliSeconds => 0x8,
            UnlockedWithin100MilliSeconds => 0x9,
            UnlockedWithin1Second => 0xA,
            UnlockedWithin10Seconds => 0xB,
            Reserved(code) => (*code as u32) & 0xF,
            Failure => 0xF,
        }
    }
}

/// The time quality flags occupying the upper byte of the 32-bit FRACSEC word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeQualityFlags(u32);

impl TimeQualityFlags {
    pub const RESERVED: u32 = 0x8000_0000;
    pub const LEAP_SECOND_DIRECTION: u32 = 0x4000_0000;
    pub const LEAP_SECOND_OCCURRED: u32 = 0x2000_0000;
    pub const LEAP_SECOND_PENDING: u32 = 0x1000_0000;
    pub const INDICATOR_CODE: BitField<u32> = BitField::new(0x0F00_0000, 24);
    pub const FLAGS_MASK: u32 = 0xFF00_0000;

    /// Keeps only the time quality bits of `raw`.
    pub const fn from_raw(raw: u32) -> Self {
        TimeQualityFlags(raw & Self::FLAGS_MASK)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub fn indicator_code(&self) -> TimeQualityIndicatorCode {
        TimeQualityIndicatorCode::from_bits(Self::INDICATOR_CODE.get(self.0))
    }

    pub fn with_indicator_code(self, code: TimeQualityIndicatorCode) -> Self {
        TimeQualityFlags(Self::INDICATOR_CODE.set(self.0, code.bits()))
    }

    pub fn leap_second_pending(&self) -> bool {
        self.0 & Self::LEAP_SECOND_PENDING != 0
    }

    pub fn leap_second_occurred(&self) -> bool {
        self.0 & Self::LEAP_SECOND_OCCURRED != 0
    }

    /// `true` when the pending or occurred leap second is a deletion.
    pub fn leap_second_subtracted(&self) -> bool {
        self.0 & Self::LEAP_SECOND_DIRECTION != 0
    }
}
