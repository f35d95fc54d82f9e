//! Status and exception reporting.
//!
//! The concentrator never lets a malformed command or a bad device definition escape as
//! an error from its processing loops. Each such event is logged and handed to an
//! `EventSink` with a `MessageLevel`.

use std::fmt;

use parking_lot::Mutex;

use crate::error::ConcentratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "Info"),
            MessageLevel::Warning => write!(f, "Warning"),
            MessageLevel::Error => write!(f, "Error"),
        }
    }
}

/// Receiver of concentrator status messages and process exceptions.
pub trait EventSink: Send + Sync {
    fn status(&self, level: MessageLevel, message: &str);
    fn exception(&self, level: MessageLevel, error: &ConcentratorError);
}

/// Sink that drops every event. The concentrator still logs them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn status(&self, _level: MessageLevel, _message: &str) {}
    fn exception(&self, _level: MessageLevel, _error: &ConcentratorError) {}
}

/// An event captured by `RecordingEventSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Status { level: MessageLevel, message: String },
    Exception { level: MessageLevel, message: String },
}

/// Sink that keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Status messages only.
    pub fn statuses(&self) -> Vec<(MessageLevel, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Status { level, message } => Some((*level, message.clone())),
                Event::Exception { .. } => None,
            })
            .collect()
    }

    /// Exception messages only.
    pub fn exceptions(&self) -> Vec<(MessageLevel, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Exception { level, message } => Some((*level, message.clone())),
                Event::Status { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn status(&self, level: MessageLevel, message: &str) {
        self.events.lock().push(Event::Status {
            level,
            message: message.to_string(),
        });
    }

    fn exception(&self, level: MessageLevel, error: &ConcentratorError) {
        self.events.lock().push(Event::Exception {
            level,
            message: error.to_string(),
        });
    }
}

/// Writes an event to the `log` facade at the matching level.
pub(crate) fn log_event(level: MessageLevel, message: &str) {
    match level {
        MessageLevel::Info => log::info!("{}", message),
        MessageLevel::Warning => log::warn!("{}", message),
        MessageLevel::Error => log::error!("{}", message),
    }
}
