use std::path::PathBuf;

use crate::exception::ExceptionCode;
use crate::types::UnitId;

/// Recoverable errors returned by client requests
///
/// Every variant is a transport or protocol fault. The schedule engine routes
/// all of them into the host's reconnect path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// An I/O error occurred
    #[error("I/O error: {0:?}")]
    Io(std::io::ErrorKind),
    /// No response (or connection) within the configured timeout
    #[error("timeout occurred before receiving a response from the server")]
    ResponseTimeout,
    /// No connection exists to the Modbus server
    #[error("no connection exists to the Modbus server")]
    NoConnection,
    /// The server answered with an exception response
    #[error("function {function:#04X} failed with exception: {exception}")]
    Exception {
        /// function code of the request, without the error bit
        function: u8,
        /// exception code carried by the response
        exception: ExceptionCode,
    },
    /// The MBAP header of a frame is invalid
    #[error("bad frame: {0}")]
    BadFrame(FrameParseError),
    /// The response PDU has an unexpected shape
    #[error("bad response: {0}")]
    BadResponse(AduParseError),
    /// The response came from another unit
    #[error("response unit id {received} does not match the request unit id {expected}")]
    UnitIdMismatch {
        /// unit id of the request
        expected: UnitId,
        /// unit id of the response
        received: UnitId,
    },
    /// An internal error occurred in the library itself
    #[error("internal error: {0}")]
    Internal(InternalError),
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<scursor::ReadError> for AduParseError {
    fn from(_: scursor::ReadError) -> Self {
        AduParseError::InsufficientBytes
    }
}

impl From<scursor::TrailingBytes> for AduParseError {
    fn from(x: scursor::TrailingBytes) -> Self {
        AduParseError::TrailingBytes(x.count.get())
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(err: scursor::ReadError) -> Self {
        AduParseError::from(err).into()
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<tokio::time::error::Elapsed> for RequestError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RequestError::ResponseTimeout
    }
}

/// Errors that occur while parsing a frame off a stream
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameParseError {
    /// Received TCP frame with the length field set to zero
    #[error("received TCP frame with the length field set to zero")]
    MbapLengthZero,
    /// Received TCP frame with length that exceeds max allowed size
    #[error("received TCP frame with length ({0}) that exceeds max allowed size ({1})")]
    MbapLengthTooBig(usize, usize),
    /// Received TCP frame with a non-Modbus protocol id
    #[error("received TCP frame with non-Modbus protocol id: {0}")]
    UnknownProtocolId(u16),
}

/// Errors that occur while parsing a PDU
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AduParseError {
    /// Response is too short to be valid
    #[error("response is too short to be valid")]
    InsufficientBytes,
    /// Response contains extra trailing bytes
    #[error("response contains {0} extra trailing bytes")]
    TrailingBytes(usize),
    /// A response field doesn't match the request
    #[error("a parameter in the reply doesn't match the request")]
    ReplyEchoMismatch,
    /// Unknown response function code
    #[error("received unknown response function code: {0}. Expected {1} or {2}")]
    UnknownResponseFunction(u8, u8, u8),
    /// Bad value for the coil state
    #[error("received coil state with unspecified value: {0:#06X}")]
    UnknownCoilState(u16),
}

/// Errors that indicate faulty logic in the library itself
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    /// Insufficient space for write operation
    #[error("attempted to write {0} bytes with {1} bytes remaining")]
    InsufficientWriteSpace(usize, usize),
    /// The calculated frame size exceeds what is allowed by the protocol
    #[error("frame length of {0} exceeds the maximum allowed length of {1}")]
    FrameTooBig(usize, usize),
    /// Cursor seek operation exceeded the bounds of the underlying buffer
    #[error("cursor seek operation exceeded the bounds of the underlying buffer")]
    BadSeekOperation,
    /// Byte count would exceed maximum allowed size in the ADU of u8
    #[error("byte count would exceed maximum size of u8: {0}")]
    BadByteCount(usize),
}

/// Errors that result from an invalid address range
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRange {
    /// Count of zero not allowed
    #[error("range contains count == 0")]
    CountOfZero,
    /// Address in range overflows u16
    #[error("start == {0} and count = {1} would overflow the representation of u16")]
    AddressOverflow(u16, u16),
    /// Count too large for type
    #[error("the request count of {0} exceeds maximum allowed count of {1} for this type")]
    CountTooLargeForType(u16, u16),
}

/// Name that doesn't match any [`DecodeLevel`](crate::DecodeLevel) preset
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown decode level '{0}', expected one of: nothing, headers, values, full")]
pub struct InvalidDecodeLevel(String);

impl InvalidDecodeLevel {
    pub(crate) fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Fatal configuration errors
///
/// These are reported once at startup and abort the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("unable to read {path}: {source}")]
    Read {
        /// path of the file
        path: PathBuf,
        /// underlying error
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML or misses required sections
    #[error("syntax error: {0}")]
    Syntax(#[from] toml::de::Error),
    /// The interactive session ended or failed
    #[error("interactive input failed: {0}")]
    Input(String),
    /// At least one area is required
    #[error("at least one area is required")]
    NoAreas,
    /// At least one schedule is required
    #[error("at least one schedule is required")]
    NoSchedules,
    /// A schedule has an empty id
    #[error("schedule without id")]
    MissingId,
    /// Two schedules share an id
    #[error("duplicate schedule id: {0}")]
    DuplicateId(String),
    /// Two areas share a coil
    #[error("areas '{0}' and '{1}' both map to coil {2}")]
    DuplicateCoil(String, String, u16),
    /// A schedule references an area that doesn't exist
    #[error("schedule {schedule} references unknown area '{area}'")]
    UnknownArea {
        /// schedule id
        schedule: String,
        /// referenced area
        area: String,
    },
    /// Weekly schedule without any day
    #[error("schedule {0} has no days")]
    NoDays(String),
    /// Once schedule without a date
    #[error("schedule {0} needs a date")]
    MissingDate(String),
    /// Duration must be positive
    #[error("schedule {0} has a bad duration")]
    ZeroDuration(String),
    /// Unknown schedule type
    #[error("unknown schedule type: {0}")]
    UnknownType(String),
    /// Day name not recognized
    #[error("unknown day: {0}")]
    BadDay(String),
    /// Time is not HH:MM
    #[error("bad time (expected HH:MM): {0}")]
    BadTime(String),
    /// Date is not YYYY-MM-DD
    #[error("bad date (expected YYYY-MM-DD): {0}")]
    BadDate(String),
}
