//! # pdc Command Line Tool
//!
//! Library side of the `pdc` executable.
//!
//! ## Key Components
//!
//! - `serve`: Hosts a concentrator on TCP with simulated measurements.
//! - `request`: Sends one command to a concentrator and formats the reply.
//! - `logging`: Installs the tracing subscriber.

pub mod logging;
pub mod request;
pub mod serve;
