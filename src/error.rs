use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while talking to one device during one poll.
///
/// These never escape a single device's poll: the coordinator logs them and
/// moves on, and `probe()` folds all of them into `false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("checksum mismatch: received {received:#06x}, calculated {calculated:#06x}")]
    ChecksumMismatch { received: u16, calculated: u16 },

    #[error("response too short: {len} bytes, need at least {min}")]
    ShortResponse { len: usize, min: usize },

    #[error("unexpected slave id: got {got}, expected {expected}")]
    UnexpectedSlaveId { expected: u8, got: u8 },

    #[error("unexpected function code in response: got {got:#04x}, expected {expected:#04x}")]
    UnexpectedFunctionCode { expected: u8, got: u8 },

    // function code with the high bit set; the device rejected the request
    #[error("device exception for function {function:#04x}: exception code {exception_code:#04x}")]
    DeviceException { function: u8, exception_code: u8 },

    #[error("register count mismatch: byte count {byte_count}, payload {payload_len} bytes, expected {expected_registers:?} registers")]
    RegisterCountMismatch {
        byte_count: usize,
        payload_len: usize,
        expected_registers: Option<u16>,
    },

    #[error("write response echoed start register {got}, expected {expected}")]
    UnexpectedStartRegister { expected: u16, got: u16 },

    #[error("unknown provider kind: {0}")]
    UnknownProviderKind(String),

    #[error("transport timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("ascii decode failure: {0}")]
    DecodeAsciiFailure(String),

    #[error("invalid frame argument: {0}")]
    InvalidFrameArgument(String),

    #[error("invalid estimator configuration: {0}")]
    InvalidEstimatorConfig(String),
}

impl Error {
    /// True for both flavours of a bad function code, plain mismatch or
    /// device-reported exception.
    pub fn is_function_code_error(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedFunctionCode { .. } | Error::DeviceException { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::TransportFailure(format!("IO error: {}", err))
    }
}
