use crate::common::bits;
use crate::common::cursor::WriteCursor;
use crate::common::frame::Serialize;
use crate::common::function::{FunctionCode, ERROR_BIT};
use crate::decode::PduDecodeLevel;
use crate::error::{AduParseError, InternalError};
use crate::exception::ExceptionCode;
use crate::types::{coil_from_u16, coil_to_u16, AddressRange, Indexed};

use scursor::ReadCursor;

/// function code plus two u16 fields
pub(crate) const MIN_REQUEST_LENGTH: usize = 5;

/// The four requests understood by both ends of the link
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    ReadCoils(AddressRange),
    ReadHoldingRegisters(AddressRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
}

/// Why a request PDU could not be decoded
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RequestParseError {
    /// no function code at all, nothing can be answered
    Empty,
    /// answer with `function | 0x80` and the exception
    Exception {
        function: u8,
        exception: ExceptionCode,
    },
}

impl Request {
    pub(crate) fn function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils(_) => FunctionCode::ReadCoils,
            Request::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
        }
    }

    /// Decode a request PDU
    ///
    /// Unknown function codes map to IllegalFunction, anything too short or
    /// carrying an undefined coil state maps to IllegalDataValue. Trailing
    /// bytes are ignored.
    pub(crate) fn parse(pdu: &[u8]) -> Result<Self, RequestParseError> {
        let mut cursor = ReadCursor::new(pdu);
        let value = cursor.read_u8().map_err(|_| RequestParseError::Empty)?;

        let function = match FunctionCode::get(value) {
            Some(x) => x,
            None => {
                return Err(RequestParseError::Exception {
                    function: value | ERROR_BIT,
                    exception: ExceptionCode::IllegalFunction,
                })
            }
        };

        let bad_value = || RequestParseError::Exception {
            function: function.as_error(),
            exception: ExceptionCode::IllegalDataValue,
        };

        if pdu.len() < MIN_REQUEST_LENGTH {
            return Err(bad_value());
        }

        let first = cursor.read_u16_be().map_err(|_| bad_value())?;
        let second = cursor.read_u16_be().map_err(|_| bad_value())?;

        let request = match function {
            FunctionCode::ReadCoils => Request::ReadCoils(AddressRange {
                start: first,
                count: second,
            }),
            FunctionCode::ReadHoldingRegisters => Request::ReadHoldingRegisters(AddressRange {
                start: first,
                count: second,
            }),
            // only 0xFF00 and 0x0000 are defined, anything else is IllegalDataValue
            FunctionCode::WriteSingleCoil => Request::WriteSingleCoil(Indexed::new(
                first,
                coil_from_u16(second).map_err(|_| bad_value())?,
            )),
            FunctionCode::WriteSingleRegister => {
                Request::WriteSingleRegister(Indexed::new(first, second))
            }
        };

        Ok(request)
    }
}

impl Serialize for Request {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u8(self.function().get_value())?;
        match self {
            Request::ReadCoils(range) | Request::ReadHoldingRegisters(range) => {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)
            }
            Request::WriteSingleCoil(x) => {
                cursor.write_u16_be(x.index)?;
                cursor.write_u16_be(coil_to_u16(x.value))
            }
            Request::WriteSingleRegister(x) => {
                cursor.write_u16_be(x.index)?;
                cursor.write_u16_be(x.value)
            }
        }
    }
}

/// Server side response PDUs
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    ReadCoils(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    Exception {
        /// function code with the error bit already set
        function: u8,
        exception: ExceptionCode,
    },
}

impl Reply {
    pub(crate) fn exception(function: FunctionCode, exception: ExceptionCode) -> Self {
        Reply::Exception {
            function: function.as_error(),
            exception,
        }
    }
}

impl Serialize for Reply {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        match self {
            Reply::ReadCoils(values) => {
                cursor.write_u8(FunctionCode::ReadCoils.get_value())?;
                let byte_count = bits::num_bytes_for_bits(values.len() as u16);
                let byte_count =
                    u8::try_from(byte_count).map_err(|_| InternalError::BadByteCount(byte_count))?;
                cursor.write_u8(byte_count)?;
                let mut packed = Vec::with_capacity(byte_count as usize);
                bits::pack(values, &mut packed);
                for byte in packed {
                    cursor.write_u8(byte)?;
                }
                Ok(())
            }
            Reply::ReadHoldingRegisters(values) => {
                cursor.write_u8(FunctionCode::ReadHoldingRegisters.get_value())?;
                let byte_count = 2 * values.len();
                let byte_count =
                    u8::try_from(byte_count).map_err(|_| InternalError::BadByteCount(byte_count))?;
                cursor.write_u8(byte_count)?;
                for value in values {
                    cursor.write_u16_be(*value)?;
                }
                Ok(())
            }
            Reply::WriteSingleCoil(x) => Request::WriteSingleCoil(*x).serialize(cursor),
            Reply::WriteSingleRegister(x) => Request::WriteSingleRegister(*x).serialize(cursor),
            Reply::Exception {
                function,
                exception,
            } => {
                cursor.write_u8(*function)?;
                cursor.write_u8((*exception).into())
            }
        }
    }
}

/// Returns the exception carried by a response PDU, if its function code has the error bit set
pub(crate) fn parse_exception(pdu: &[u8]) -> Option<(u8, ExceptionCode)> {
    let mut cursor = ReadCursor::new(pdu);
    let function = cursor.read_u8().ok()?;
    if function & ERROR_BIT == 0 {
        return None;
    }
    let exception = match cursor.read_u8() {
        Ok(value) => ExceptionCode::from(value),
        Err(_) => ExceptionCode::Unknown(0),
    };
    Some((function & !ERROR_BIT, exception))
}

/// Decode `[0x01][byte count][bitmap]` for `count` coils
///
/// Anything but the exact success shape yields `None`.
pub(crate) fn parse_read_coils(pdu: &[u8], count: u16) -> Option<Vec<bool>> {
    let mut cursor = ReadCursor::new(pdu);
    if cursor.read_u8().ok()? != FunctionCode::ReadCoils.get_value() {
        return None;
    }
    let byte_count = cursor.read_u8().ok()? as usize;
    if byte_count != bits::num_bytes_for_bits(count) {
        return None;
    }
    let bitmap = cursor.read_bytes(byte_count).ok()?;
    cursor.expect_empty().ok()?;
    (0..count as usize).map(|i| bits::get(bitmap, i)).collect()
}

/// Decode `[0x03][byte count][values]` for `count` registers
///
/// Anything but the exact success shape yields `None`.
pub(crate) fn parse_read_registers(pdu: &[u8], count: u16) -> Option<Vec<u16>> {
    let mut cursor = ReadCursor::new(pdu);
    if cursor.read_u8().ok()? != FunctionCode::ReadHoldingRegisters.get_value() {
        return None;
    }
    let byte_count = cursor.read_u8().ok()? as usize;
    if byte_count != 2 * count as usize {
        return None;
    }
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        values.push(cursor.read_u16_be().ok()?);
    }
    cursor.expect_empty().ok()?;
    Some(values)
}

/// Decode the echo of a single write, returning the echoed address and raw value
pub(crate) fn parse_write_echo(
    pdu: &[u8],
    function: FunctionCode,
) -> Result<Indexed<u16>, AduParseError> {
    let mut cursor = ReadCursor::new(pdu);
    let value = cursor.read_u8()?;
    if value != function.get_value() {
        return Err(AduParseError::UnknownResponseFunction(
            value,
            function.get_value(),
            function.as_error(),
        ));
    }
    let index = cursor.read_u16_be()?;
    let raw = cursor.read_u16_be()?;
    cursor.expect_empty()?;
    Ok(Indexed::new(index, raw))
}

pub(crate) struct RequestDisplay<'a> {
    level: PduDecodeLevel,
    request: &'a Request,
}

impl<'a> RequestDisplay<'a> {
    pub(crate) fn new(level: PduDecodeLevel, request: &'a Request) -> Self {
        Self { level, request }
    }
}

impl std::fmt::Display for RequestDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.request.function())?;
        if self.level.data_headers() {
            match self.request {
                Request::ReadCoils(range) | Request::ReadHoldingRegisters(range) => {
                    write!(f, " {range}")?
                }
                Request::WriteSingleCoil(x) => write!(f, " {x}")?,
                Request::WriteSingleRegister(x) => write!(f, " {x}")?,
            }
        }
        Ok(())
    }
}

pub(crate) struct ReplyDisplay<'a> {
    level: PduDecodeLevel,
    reply: &'a Reply,
}

impl<'a> ReplyDisplay<'a> {
    pub(crate) fn new(level: PduDecodeLevel, reply: &'a Reply) -> Self {
        Self { level, reply }
    }
}

impl std::fmt::Display for ReplyDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reply {
            Reply::ReadCoils(values) => {
                write!(f, "{} qty: {}", FunctionCode::ReadCoils, values.len())?;
                if self.level.data_values() {
                    for value in values {
                        write!(f, " {}", *value as u8)?;
                    }
                }
            }
            Reply::ReadHoldingRegisters(values) => {
                write!(
                    f,
                    "{} qty: {}",
                    FunctionCode::ReadHoldingRegisters,
                    values.len()
                )?;
                if self.level.data_values() {
                    for value in values {
                        write!(f, " {value:#06X}")?;
                    }
                }
            }
            Reply::WriteSingleCoil(x) => write!(f, "{} {}", FunctionCode::WriteSingleCoil, x)?,
            Reply::WriteSingleRegister(x) => {
                write!(f, "{} {}", FunctionCode::WriteSingleRegister, x)?
            }
            Reply::Exception {
                function,
                exception,
            } => write!(f, "EXCEPTION ({function:#04X}): {exception}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &dyn Serialize) -> Vec<u8> {
        let mut buffer = [0u8; 260];
        let mut cursor = WriteCursor::new(&mut buffer);
        msg.serialize(&mut cursor).unwrap();
        let length = cursor.position();
        buffer[..length].to_vec()
    }

    #[test]
    fn read_coils_request_round_trips() {
        let request = Request::ReadCoils(AddressRange::try_from(0x0102, 10).unwrap());
        let bytes = encode(&request);
        assert_eq!(bytes, vec![0x01, 0x01, 0x02, 0x00, 0x0A]);
        assert_eq!(Request::parse(&bytes), Ok(request));
    }

    #[test]
    fn read_holding_registers_request_round_trips() {
        let request = Request::ReadHoldingRegisters(AddressRange::try_from(100, 10).unwrap());
        let bytes = encode(&request);
        assert_eq!(bytes, vec![0x03, 0x00, 0x64, 0x00, 0x0A]);
        assert_eq!(Request::parse(&bytes), Ok(request));
    }

    #[test]
    fn write_single_coil_request_round_trips() {
        let on = Request::WriteSingleCoil(Indexed::new(5, true));
        let bytes = encode(&on);
        assert_eq!(bytes, vec![0x05, 0x00, 0x05, 0xFF, 0x00]);
        assert_eq!(Request::parse(&bytes), Ok(on));

        let off = Request::WriteSingleCoil(Indexed::new(5, false));
        let bytes = encode(&off);
        assert_eq!(bytes, vec![0x05, 0x00, 0x05, 0x00, 0x00]);
        assert_eq!(Request::parse(&bytes), Ok(off));
    }

    #[test]
    fn write_single_register_request_round_trips() {
        let request = Request::WriteSingleRegister(Indexed::new(0, 0xCAFE));
        let bytes = encode(&request);
        assert_eq!(bytes, vec![0x06, 0x00, 0x00, 0xCA, 0xFE]);
        assert_eq!(Request::parse(&bytes), Ok(request));
    }

    #[test]
    fn unknown_function_is_illegal_function() {
        assert_eq!(
            Request::parse(&[0x10, 0x00, 0x00, 0x00, 0x01]),
            Err(RequestParseError::Exception {
                function: 0x90,
                exception: ExceptionCode::IllegalFunction
            })
        );
        // even when too short to be anything
        assert_eq!(
            Request::parse(&[0x2B]),
            Err(RequestParseError::Exception {
                function: 0xAB,
                exception: ExceptionCode::IllegalFunction
            })
        );
    }

    #[test]
    fn short_pdu_is_illegal_data_value() {
        assert_eq!(
            Request::parse(&[0x03, 0x00, 0x00, 0x00]),
            Err(RequestParseError::Exception {
                function: 0x83,
                exception: ExceptionCode::IllegalDataValue
            })
        );
    }

    #[test]
    fn undefined_coil_state_is_illegal_data_value() {
        assert_eq!(
            Request::parse(&[0x05, 0x00, 0x01, 0x12, 0x34]),
            Err(RequestParseError::Exception {
                function: 0x85,
                exception: ExceptionCode::IllegalDataValue
            })
        );
    }

    #[test]
    fn empty_pdu_cannot_be_answered() {
        assert_eq!(Request::parse(&[]), Err(RequestParseError::Empty));
    }

    #[test]
    fn coil_reply_round_trips_through_client_decoder() {
        let values = vec![true, false, true, true, false, false, false, false, true];
        let bytes = encode(&Reply::ReadCoils(values.clone()));
        assert_eq!(bytes, vec![0x01, 0x02, 0b0000_1101, 0b0000_0001]);
        assert_eq!(parse_read_coils(&bytes, 9), Some(values));
    }

    #[test]
    fn register_reply_round_trips_through_client_decoder() {
        let bytes = encode(&Reply::ReadHoldingRegisters(vec![0x0102, 0xFFFF]));
        assert_eq!(bytes, vec![0x03, 0x04, 0x01, 0x02, 0xFF, 0xFF]);
        assert_eq!(parse_read_registers(&bytes, 2), Some(vec![0x0102, 0xFFFF]));
    }

    #[test]
    fn read_decoders_reject_mismatched_shapes() {
        // wrong byte count
        assert_eq!(parse_read_registers(&[0x03, 0x02, 0x00, 0x01], 2), None);
        // trailing bytes
        assert_eq!(parse_read_coils(&[0x01, 0x01, 0x01, 0x00], 1), None);
        // wrong function
        assert_eq!(parse_read_coils(&[0x03, 0x01, 0x01], 1), None);
        // truncated
        assert_eq!(parse_read_registers(&[0x03, 0x02, 0x00], 1), None);
    }

    #[test]
    fn exception_replies_are_detected() {
        let bytes = encode(&Reply::exception(
            FunctionCode::ReadCoils,
            ExceptionCode::IllegalDataAddress,
        ));
        assert_eq!(bytes, vec![0x81, 0x02]);
        assert_eq!(
            parse_exception(&bytes),
            Some((0x01, ExceptionCode::IllegalDataAddress))
        );
        assert_eq!(parse_exception(&[0x01, 0x01, 0x00]), None);
    }

    #[test]
    fn write_echo_rejects_other_functions() {
        assert_eq!(
            parse_write_echo(&[0x06, 0x00, 0x01, 0x00, 0x02], FunctionCode::WriteSingleCoil),
            Err(AduParseError::UnknownResponseFunction(0x06, 0x05, 0x85))
        );
        assert_eq!(
            parse_write_echo(&[0x05, 0x00, 0x01, 0xFF], FunctionCode::WriteSingleCoil),
            Err(AduParseError::InsufficientBytes)
        );
        assert_eq!(
            parse_write_echo(&[0x05, 0x00, 0x01, 0xFF, 0x00], FunctionCode::WriteSingleCoil),
            Ok(Indexed::new(1, 0xFF00))
        );
    }

    #[test]
    fn write_echo_maps_cursor_errors() {
        assert_eq!(
            parse_write_echo(&[0x06, 0x00], FunctionCode::WriteSingleRegister),
            Err(AduParseError::InsufficientBytes)
        );
        assert_eq!(
            parse_write_echo(
                &[0x06, 0x00, 0x01, 0x00, 0x02, 0xCA, 0xFE],
                FunctionCode::WriteSingleRegister
            ),
            Err(AduParseError::TrailingBytes(2))
        );
    }
}
