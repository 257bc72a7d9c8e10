//! Error taxonomy for the stack.
//!
//! One flat `thiserror` enum per concern, matching `deconz_protocol::types::
//! ProtocolError`'s shape: `#[from]` for the boundaries we actually cross
//! (io, json, the transport's own error type).

use thiserror::Error;

/// Failed to parse a wire frame, struct, or ZCL command.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("input exhausted, needed at least {needed} more byte(s), got {got}")]
    UnexpectedEof { needed: usize, got: usize },
    #[error("invalid enum discriminant 0x{0:02x}")]
    InvalidDiscriminant(u32),
    #[error("invalid UTF-8 in character string")]
    InvalidUtf8,
    #[error("trailing {0} byte(s) after struct deserialization")]
    TrailingData(usize),
    #[error("optional field after non-optional field in struct definition")]
    BadOptionalOrdering,
    #[error("unknown attribute type tag 0x{0:02x}")]
    UnknownTypeTag(u8),
}

/// Radio-level delivery failure, surfaced to the caller of `Device::request`.
#[derive(Debug, Error)]
#[error("delivery failed (status={status:?}): {message}")]
pub struct DeliveryError {
    pub message: String,
    pub status: Option<u8>,
}

/// A ZDO or ZCL response carried a non-SUCCESS status, or a reply's shape
/// didn't match the schema we expected for its command id.
#[derive(Debug, Error)]
pub enum InvalidResponse {
    #[error("response status {status:?} for command {command}")]
    BadStatus { command: String, status: String },
    #[error("response schema mismatch for command {0}")]
    SchemaMismatch(String),
}

/// Application-controller-level and stack-wide errors. Named after zigpy's
/// `exceptions.py` hierarchy (`ZigbeeException` and its subclasses); Rust
/// flattens the hierarchy into one enum with matching variant names rather
/// than an inheritance chain, since downstream code matches on kind, not
/// type identity.
#[derive(Debug, Error)]
pub enum ZigbeeError {
    #[error("parse error: {0}")]
    Parse(#[from] CodecError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(#[from] InvalidResponse),

    #[error("controller error: {0}")]
    Controller(String),

    #[error("radio API error: {0}")]
    Api(String),

    #[error("network cannot be started: no stored network info on the radio")]
    NetworkNotFormed,

    #[error("network settings could not be written to the radio")]
    FormationFailure,

    #[error("loaded network settings are inconsistent with stored state")]
    NetworkSettingsInconsistent,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("device {0} is not yet initialized")]
    DeviceNotInitialized(String),

    #[error("duplicate TSN reservation: {0}")]
    DuplicateTsn(u8),

    #[error("an OTA session is already in progress for this device")]
    OtaSessionInProgress,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ZigbeeError>;
