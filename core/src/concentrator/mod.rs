//! # Phasor Data Concentrator
//!
//! Publishes one IEEE C37.118 output stream built from protocol independent device
//! descriptions and individually arriving measurements.
//!
//! ## Key Components
//!
//! - `settings`: Connection string parsing and typed settings.
//! - `descriptor`, `builder`: Device descriptions and the configuration frame builder.
//! - `notification`: The live configuration and its change notification window.
//! - `measurement`, `frame_queue`: Time alignment of measurements into frame slots.
//! - `manager`: The `Concentrator` tying these together.
//! - `dispatcher`: Command frame handling.
//! - `clock`, `events`, `channel`: Collaborators injected into the `Concentrator`.
//! - `random`: Simulated devices and measurements.

pub mod builder;
pub mod channel;
pub mod clock;
pub mod descriptor;
pub mod dispatcher;
pub mod events;
pub mod frame_queue;
pub mod manager;
pub mod measurement;
pub mod notification;
pub mod random;
pub mod settings;

pub use channel::{ClientId, FrameChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::BaseConfigurationFrame;
pub use events::{EventSink, MessageLevel};
pub use manager::Concentrator;
pub use settings::ConcentratorSettings;
