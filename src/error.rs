use thiserror::Error;

/// Errors raised by the simulation and its control layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("BSON encoding error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("BSON decoding error: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("LZ4 decompression error: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),

    #[error("unknown {kind} '{id}'")]
    Unknown { kind: &'static str, id: String },

    #[error("vehicle '{0}' already exists")]
    DuplicateVehicle(String),

    #[error("no path from edge '{from}' to edge '{to}'")]
    NoPath { from: String, to: String },

    #[error("invalid phase plan for '{junction}': {reason}")]
    InvalidPhasePlan { junction: String, reason: String },

    #[error("'{0}' is not a ramp meter")]
    NotAMeter(String),

    #[error("controller '{id}' does not support {operation}")]
    UnsupportedOperation { id: String, operation: &'static str },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no vehicles available for incident")]
    NoIncidentVehicles,

    #[error("unsupported file format '{0}'")]
    UnsupportedFormat(String),

    #[error("simulation has not been started")]
    NotStarted,

    #[error("simulation has already been started")]
    AlreadyStarted,

    #[error("simulation has ended")]
    Ended,
}

impl Error {
    pub(crate) fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Error::Unknown {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
