use crate::constants::exceptions;

/// Exception codes defined in the Modbus specification
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
pub enum ExceptionCode {
    /// The function code received in the query is not an allowable action for the server
    IllegalFunction,
    /// The data address received in the query is not an allowable address for the server
    IllegalDataAddress,
    /// A value contained in the request is not an allowable value for server
    IllegalDataValue,
    /// An unrecoverable error occurred while the server was attempting to perform the requested
    /// action
    ServerDeviceFailure,
    /// Specialized use in conjunction with programming commands
    Acknowledge,
    /// The server is engaged in processing a long-duration command, try again later
    ServerDeviceBusy,
    /// The server detected a parity error in its memory
    MemoryParityError,
    /// Specialized use in conjunction with gateways.
    ///
    /// The gateway was unable to allocate an internal communication path
    GatewayPathUnavailable,
    /// Specialized use in conjunction with gateways.
    ///
    /// The emulator also answers with this code when a request is addressed
    /// to a unit id it does not own.
    GatewayTargetDeviceFailedToRespond,
    /// The exception code received is not defined in the standard
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            exceptions::ILLEGAL_FUNCTION => ExceptionCode::IllegalFunction,
            exceptions::ILLEGAL_DATA_ADDRESS => ExceptionCode::IllegalDataAddress,
            exceptions::ILLEGAL_DATA_VALUE => ExceptionCode::IllegalDataValue,
            exceptions::SERVER_DEVICE_FAILURE => ExceptionCode::ServerDeviceFailure,
            exceptions::ACKNOWLEDGE => ExceptionCode::Acknowledge,
            exceptions::SERVER_DEVICE_BUSY => ExceptionCode::ServerDeviceBusy,
            exceptions::MEMORY_PARITY_ERROR => ExceptionCode::MemoryParityError,
            exceptions::GATEWAY_PATH_UNAVAILABLE => ExceptionCode::GatewayPathUnavailable,
            exceptions::GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND => {
                ExceptionCode::GatewayTargetDeviceFailedToRespond
            }
            _ => ExceptionCode::Unknown(value),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(ex: ExceptionCode) -> Self {
        match ex {
            ExceptionCode::IllegalFunction => exceptions::ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => exceptions::ILLEGAL_DATA_ADDRESS,
            ExceptionCode::IllegalDataValue => exceptions::ILLEGAL_DATA_VALUE,
            ExceptionCode::ServerDeviceFailure => exceptions::SERVER_DEVICE_FAILURE,
            ExceptionCode::Acknowledge => exceptions::ACKNOWLEDGE,
            ExceptionCode::ServerDeviceBusy => exceptions::SERVER_DEVICE_BUSY,
            ExceptionCode::MemoryParityError => exceptions::MEMORY_PARITY_ERROR,
            ExceptionCode::GatewayPathUnavailable => exceptions::GATEWAY_PATH_UNAVAILABLE,
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                exceptions::GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND
            }
            ExceptionCode::Unknown(value) => value,
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ExceptionCode::IllegalFunction => f.write_str("function code received in the query is not an allowable action for the server"),
            ExceptionCode::IllegalDataAddress => f.write_str("data address received in the query is not an allowable address for the server"),
            ExceptionCode::IllegalDataValue => f.write_str("value contained in the request is not an allowable value for server"),
            ExceptionCode::ServerDeviceFailure => f.write_str("unrecoverable error occurred while the server was attempting to perform the requested action"),
            ExceptionCode::Acknowledge => f.write_str("server has accepted the request and is processing it"),
            ExceptionCode::ServerDeviceBusy => f.write_str("server is busy processing a long-duration command, try again later"),
            ExceptionCode::MemoryParityError => f.write_str("server detected a parity error in its memory"),
            ExceptionCode::GatewayPathUnavailable => f.write_str("gateway was unable to allocate an internal communication path"),
            ExceptionCode::GatewayTargetDeviceFailedToRespond => f.write_str("gateway did not receive a response from the target device"),
            ExceptionCode::Unknown(code) => write!(f, "received unknown exception code: {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_preserved() {
        let code = ExceptionCode::from(0x42);
        assert_eq!(code, ExceptionCode::Unknown(0x42));
        assert_eq!(u8::from(code), 0x42);
    }

    #[test]
    fn gateway_code_maps_to_0x0b() {
        assert_eq!(
            ExceptionCode::from(0x0B),
            ExceptionCode::GatewayTargetDeviceFailedToRespond
        );
        assert_eq!(u8::from(ExceptionCode::GatewayTargetDeviceFailedToRespond), 0x0B);
    }
}
