use std::net::SocketAddr;
use std::time::Duration;

use tracing::Instrument;

use crate::common::frame::{Frame, FrameHeader, FrameWriter, FramedReader, TxId};
use crate::common::function::FunctionCode;
use crate::common::pdu::{self, Request, RequestDisplay};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::{AduParseError, RequestError};
use crate::types::{coil_to_u16, AddressRange, Indexed, UnitId};

/// Default send/receive timeout of a [`ModbusClient`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Modbus/TCP client performing one request at a time against a single unit
///
/// Transaction ids start at 0 and wrap. Any I/O, framing, or timeout error
/// closes the connection; the caller decides when to [`connect`](Self::connect) again.
pub struct ModbusClient {
    unit_id: UnitId,
    timeout: Duration,
    decode: DecodeLevel,
    tx_id: TxId,
    writer: FrameWriter,
    reader: FramedReader,
    phys: Option<PhysLayer>,
}

impl ModbusClient {
    /// Create a disconnected client
    pub fn new(unit_id: UnitId, timeout: Duration, decode: DecodeLevel) -> Self {
        Self {
            unit_id,
            timeout,
            decode,
            tx_id: TxId::default(),
            writer: FrameWriter::new(decode.adu),
            reader: FramedReader::new(decode.adu),
            phys: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_phys(mut self, phys: PhysLayer) -> Self {
        self.phys = Some(phys);
        self
    }

    /// Unit id placed in every request and expected in every response
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// true if a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.phys.is_some()
    }

    /// Open a connection to `addr`, closing any previous one
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<(), RequestError> {
        self.close();
        let phys = PhysLayer::connect(addr, self.timeout, self.decode.physical).await?;
        self.phys = Some(phys);
        Ok(())
    }

    /// Close the connection, if any. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.phys.take().is_some() {
            tracing::debug!("connection closed");
        }
    }

    /// Read a single coil
    ///
    /// Returns `Ok(None)` if the response is not exactly the expected success shape.
    pub async fn read_coil(&mut self, address: u16) -> Result<Option<bool>, RequestError> {
        let range = AddressRange {
            start: address,
            count: 1,
        };
        let frame = self.execute(Request::ReadCoils(range)).await?;
        match pdu::parse_read_coils(frame.payload(), 1) {
            Some(values) => Ok(values.first().copied()),
            None => {
                tracing::warn!("unexpected {} response shape", FunctionCode::ReadCoils);
                Ok(None)
            }
        }
    }

    /// Read a range of holding registers
    ///
    /// Returns an empty vector if the response is not exactly the expected success shape.
    pub async fn read_holdings(&mut self, range: AddressRange) -> Result<Vec<u16>, RequestError> {
        let frame = self.execute(Request::ReadHoldingRegisters(range)).await?;
        match pdu::parse_read_registers(frame.payload(), range.count) {
            Some(values) => Ok(values),
            None => {
                tracing::warn!(
                    "unexpected {} response shape",
                    FunctionCode::ReadHoldingRegisters
                );
                Ok(Vec::new())
            }
        }
    }

    /// Write a single coil
    pub async fn write_coil(&mut self, address: u16, value: bool) -> Result<(), RequestError> {
        let frame = self
            .execute(Request::WriteSingleCoil(Indexed::new(address, value)))
            .await?;
        check_echo(
            frame.payload(),
            FunctionCode::WriteSingleCoil,
            Indexed::new(address, coil_to_u16(value)),
        )
    }

    /// Write a single holding register
    ///
    /// The echo must repeat both the address and the value. A server that answers
    /// a write to a read-only register with the unchanged stored value yields
    /// [`AduParseError::ReplyEchoMismatch`].
    pub async fn write_holding(&mut self, address: u16, value: u16) -> Result<(), RequestError> {
        let frame = self
            .execute(Request::WriteSingleRegister(Indexed::new(address, value)))
            .await?;
        check_echo(
            frame.payload(),
            FunctionCode::WriteSingleRegister,
            Indexed::new(address, value),
        )
    }

    async fn execute(&mut self, request: Request) -> Result<Frame, RequestError> {
        let tx_id = self.tx_id.next();
        let result = self
            .execute_impl(tx_id, request)
            .instrument(tracing::info_span!("Transaction", tx_id = %tx_id))
            .await;

        if let Err(err) = &result {
            tracing::warn!("{} failed: {}", request.function(), err);
            if closes_connection(*err) {
                self.close();
            }
        }

        result
    }

    async fn execute_impl(&mut self, tx_id: TxId, request: Request) -> Result<Frame, RequestError> {
        let phys = self.phys.as_mut().ok_or(RequestError::NoConnection)?;

        if self.decode.pdu.enabled() {
            tracing::info!("PDU TX - {}", RequestDisplay::new(self.decode.pdu, &request));
        }

        let bytes = self
            .writer
            .format(FrameHeader::new(self.unit_id, tx_id), &request)?;
        phys.write(bytes).await?;

        loop {
            let frame = self.reader.next_frame(phys).await?;

            if frame.header.tx_id != tx_id {
                tracing::warn!(
                    "received {} while expecting {}, discarding",
                    frame.header.tx_id,
                    tx_id
                );
                continue;
            }

            if frame.header.unit_id != self.unit_id {
                return Err(RequestError::UnitIdMismatch {
                    expected: self.unit_id,
                    received: frame.header.unit_id,
                });
            }

            if let Some((function, exception)) = pdu::parse_exception(frame.payload()) {
                return Err(RequestError::Exception {
                    function,
                    exception,
                });
            }

            if self.decode.pdu.enabled() {
                tracing::info!("PDU RX - {} ({} bytes)", request.function(), frame.payload().len());
            }

            return Ok(frame);
        }
    }
}

fn check_echo(
    payload: &[u8],
    function: FunctionCode,
    expected: Indexed<u16>,
) -> Result<(), RequestError> {
    let echo = pdu::parse_write_echo(payload, function)?;
    if echo != expected {
        tracing::warn!(
            "{} echoed {}={:#06X} instead of {}={:#06X}",
            function,
            echo.index,
            echo.value,
            expected.index,
            expected.value
        );
        return Err(AduParseError::ReplyEchoMismatch.into());
    }
    Ok(())
}

fn closes_connection(err: RequestError) -> bool {
    match err {
        RequestError::Io(_)
        | RequestError::ResponseTimeout
        | RequestError::BadFrame(_)
        | RequestError::Internal(_) => true,
        RequestError::NoConnection
        | RequestError::Exception { .. }
        | RequestError::BadResponse(_)
        | RequestError::UnitIdMismatch { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::exception::ExceptionCode;

    fn client(mock: tokio_test::io::Mock) -> ModbusClient {
        ModbusClient::new(UnitId::new(1), DEFAULT_TIMEOUT, DecodeLevel::nothing())
            .with_phys(PhysLayer::new_mock(mock))
    }

    //                             | tx id |  proto  |  len   |unit| fc | addr   | count  |
    const READ_COIL_5: &[u8] = &[0, 0, 0, 0, 0, 6, 1, 0x01, 0, 5, 0, 1];

    #[tokio::test]
    async fn reads_a_single_coil() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0, 0, 4, 1, 0x01, 0x01, 0x01])
            .build();
        assert_eq!(client(mock).read_coil(5).await, Ok(Some(true)));
    }

    #[tokio::test]
    async fn transaction_ids_increment_per_request() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0, 0, 4, 1, 0x01, 0x01, 0x00])
            .write(&[0, 1, 0, 0, 0, 6, 1, 0x06, 0, 0, 0, 7])
            .read(&[0, 1, 0, 0, 0, 6, 1, 0x06, 0, 0, 0, 7])
            .build();
        let mut client = client(mock);
        assert_eq!(client.read_coil(5).await, Ok(Some(false)));
        assert_eq!(client.write_holding(0, 7).await, Ok(()));
    }

    #[tokio::test]
    async fn reassembles_fragmented_response() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 0, 0, 6, 1, 0x03, 0, 100, 0, 2])
            .read(&[0, 0, 0])
            .read(&[0, 0, 7, 1, 0x03])
            .read(&[0x04, 0xCA])
            .read(&[0xFE, 0x00, 0x01])
            .build();
        let range = AddressRange::try_from(100, 2).unwrap();
        assert_eq!(
            client(mock).read_holdings(range).await,
            Ok(vec![0xCAFE, 0x0001])
        );
    }

    #[tokio::test]
    async fn unit_id_mismatch_is_an_error() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0, 0, 4, 2, 0x01, 0x01, 0x01])
            .build();
        assert_eq!(
            client(mock).read_coil(5).await,
            Err(RequestError::UnitIdMismatch {
                expected: UnitId::new(1),
                received: UnitId::new(2)
            })
        );
    }

    #[tokio::test]
    async fn exception_response_is_an_error() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0, 0, 3, 1, 0x81, 0x02])
            .build();
        assert_eq!(
            client(mock).read_coil(5).await,
            Err(RequestError::Exception {
                function: 0x01,
                exception: ExceptionCode::IllegalDataAddress
            })
        );
    }

    #[tokio::test]
    async fn malformed_read_yields_no_value() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0, 0, 3, 1, 0x01, 0x00])
            .build();
        let mut client = client(mock);
        assert_eq!(client.read_coil(5).await, Ok(None));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn stale_responses_are_discarded() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0xFF, 0xFF, 0, 0, 0, 4, 1, 0x01, 0x01, 0x00])
            .read(&[0, 0, 0, 0, 0, 4, 1, 0x01, 0x01, 0x01])
            .build();
        assert_eq!(client(mock).read_coil(5).await, Ok(Some(true)));
    }

    #[tokio::test]
    async fn write_coil_checks_echoed_address() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 0, 0, 6, 1, 0x05, 0, 5, 0xFF, 0x00])
            .read(&[0, 0, 0, 0, 0, 6, 1, 0x05, 0, 6, 0xFF, 0x00])
            .build();
        assert_eq!(
            client(mock).write_coil(5, true).await,
            Err(RequestError::BadResponse(AduParseError::ReplyEchoMismatch))
        );
    }

    #[tokio::test]
    async fn write_holding_rejects_unchanged_echo() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 0, 0, 6, 1, 0x06, 0, 1, 0, 99])
            .read(&[0, 0, 0, 0, 0, 6, 1, 0x06, 0, 1, 0, 16])
            .build();
        let mut client = client(mock);
        assert_eq!(
            client.write_holding(1, 99).await,
            Err(RequestError::BadResponse(AduParseError::ReplyEchoMismatch))
        );
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn write_coil_checks_echoed_value() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 0, 0, 6, 1, 0x05, 0, 5, 0xFF, 0x00])
            .read(&[0, 0, 0, 0, 0, 6, 1, 0x05, 0, 5, 0x00, 0x00])
            .build();
        assert_eq!(
            client(mock).write_coil(5, true).await,
            Err(RequestError::BadResponse(AduParseError::ReplyEchoMismatch))
        );
    }

    #[tokio::test]
    async fn write_with_wrong_function_is_an_error() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 0, 0, 6, 1, 0x05, 0, 5, 0x00, 0x00])
            .read(&[0, 0, 0, 0, 0, 6, 1, 0x06, 0, 5, 0x00, 0x00])
            .build();
        assert_eq!(
            client(mock).write_coil(5, false).await,
            Err(RequestError::BadResponse(
                AduParseError::UnknownResponseFunction(0x06, 0x05, 0x85)
            ))
        );
    }

    #[tokio::test]
    async fn peer_close_drops_the_connection() {
        let mock = Builder::new()
            .write(READ_COIL_5)
            .read(&[0, 0, 0, 0])
            .build();
        let mut client = client(mock);
        assert_eq!(
            client.read_coil(5).await,
            Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof))
        );
        assert!(!client.is_connected());
        assert_eq!(client.read_coil(5).await, Err(RequestError::NoConnection));
    }
}
