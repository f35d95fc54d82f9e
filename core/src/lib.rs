//! # IEEE C37.118 Phasor Data Concentrator
//!
//! This crate implements the output side of a phasor data concentrator (PDC): a
//! bit-exact IEEE C37.118 frame model, a concentrator that turns device descriptions and
//! individually arriving measurements into a time aligned output stream, and a TCP
//! channel that serves the stream to clients.
//!
//! ## Submodules
//!
//! - `ieee_c37_118`: Frame model for IEEE C37.118-2005 and C37.118.2-2011.
//!   - `commands`: Command frames and device commands.
//!   - `common`: Shared types (`ParseError`, `Version`, `FrameType`, `PrefixFrame`).
//!   - `config`: Configuration frames 1 and 2.
//!   - `data_frame`: Data frames and their cells.
//!   - `flags`: STAT, FORMAT and time quality bit fields.
//!   - `header`: Header frames.
//!   - `phasors`: Phasor value encoding in the four wire formats.
//!   - `units`: Phasor, analog and digital unit words.
//!   - `utils`: CRC-CCITT and timestamp helpers.
//! - `concentrator`: Settings, configuration building, measurement sorting, data frame
//!   publication and command dispatch.
//! - `pdc_server`: tokio TCP command and data channel.
//! - `error`: The crate error type.
//!
//! ## Usage
//!
//! Build a `Concentrator` from `ConcentratorSettings`, publish a configuration with
//! `Concentrator::update_configuration`, feed measurements with
//! `Concentrator::sort_measurements` and call `Concentrator::process_tick` at the frame
//! rate, or let `pdc_server` do the ticking and serve the frames over TCP.

pub mod concentrator;
pub mod error;
pub mod ieee_c37_118;
pub mod pdc_server;
