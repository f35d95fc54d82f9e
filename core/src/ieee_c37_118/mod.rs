//! # IEEE C37.118 Frame Model
//!
//! Bit-exact encoding and decoding of the IEEE C37.118 frames a concentrator exchanges
//! with its clients, as defined in IEEE C37.118-2005 and IEEE C37.118.2-2011.
//!
//! ## Submodules
//!
//! - `common`: Shared types (`ParseError`, `PrefixFrame`, `Version`, `FrameType`).
//! - `flags`: Bit fields of the STAT, FORMAT and time quality words.
//! - `units`: Conversion factor words (PHUNIT, ANUNIT, DIGUNIT, FNOM).
//! - `phasors`: Phasor values in the four wire formats.
//! - `config`: Configuration frames 1 and 2.
//! - `data_frame`: Data frames, shaped by a configuration frame.
//! - `commands`: Command frames.
//! - `header`: Header frames.
//! - `utils`: CRC-CCITT, timestamps and fixed-width labels.
//!
//! ## Usage
//!
//! Every frame type exposes `to_hex` to produce a complete image (FRAMESIZE and checksum
//! included) and `from_hex` to parse one back.

pub mod commands;
pub mod common;
pub mod config;
pub mod data_frame;
pub mod flags;
pub mod header;
pub mod phasors;
pub mod units;
pub mod utils;
