//! Crate-level error type.
//!
//! Frame codecs report `ParseError`; everything above them (settings, configuration
//! building, command dispatch, the network channel) reports `ConcentratorError`.

use uuid::Uuid;

use crate::ieee_c37_118::common::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum ConcentratorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Required setting \"{0}\" is missing")]
    MissingSetting(String),

    #[error("Invalid value for setting \"{key}\": {message}")]
    InvalidSetting { key: String, message: String },

    #[error("Failed to define output stream device \"{device}\" due to exception: {message}")]
    InvalidDevice { device: String, message: String },

    #[error(
        "Remotely connected device \"{connection}\" sent an unrecognized data sequence to the \
         concentrator, no action was taken. Exception details: {source}"
    )]
    UnrecognizedData {
        connection: String,
        #[source]
        source: ParseError,
    },

    #[error("No configuration frame has been defined for the concentrator")]
    NoConfiguration,

    #[error("Client {0} is not connected")]
    UnknownClient(Uuid),

    #[error("Client {0} is not reading its frames, frame dropped")]
    ClientBacklog(Uuid),

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConcentratorError>;
