use std::convert::TryFrom;

use crate::common::cursor::WriteCursor;
use crate::common::phys::{format_bytes, PhysLayer};
use crate::decode::AduDecodeLevel;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::UnitId;

use scursor::ReadCursor;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
    pub(crate) const MAX_FRAME_LENGTH: usize = HEADER_LENGTH + MAX_ADU_LENGTH;
    // includes the 1 byte unit id
    pub(crate) const MAX_LENGTH_FIELD: usize = MAX_ADU_LENGTH + 1;
}

/// Anything that can be written into a PDU, function code included
pub(crate) trait Serialize {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError>;
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }

    /// returns the current value and advances, wrapping at 65536
    pub(crate) fn next(&mut self) -> TxId {
        let ret = self.value;
        self.value = self.value.wrapping_add(1);
        TxId::new(ret)
    }
}

impl Default for TxId {
    fn default() -> Self {
        TxId::new(0)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) unit_id: UnitId,
    pub(crate) tx_id: TxId,
}

impl FrameHeader {
    pub(crate) fn new(unit_id: UnitId, tx_id: TxId) -> Self {
        FrameHeader { unit_id, tx_id }
    }
}

impl std::fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx_id: {} unit: {}", self.tx_id, self.unit_id)
    }
}

pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    pdu: [u8; constants::MAX_ADU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            pdu: [0; constants::MAX_ADU_LENGTH],
        }
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.pdu[0..self.length]
    }

    fn body_mut(&mut self, length: usize) -> Result<&mut [u8], FrameParseError> {
        if length > self.pdu.len() {
            return Err(FrameParseError::MbapLengthTooBig(
                length + 1,
                constants::MAX_LENGTH_FIELD,
            ));
        }
        self.length = length;
        Ok(&mut self.pdu[0..length])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct MbapHeader {
    tx_id: TxId,
    adu_length: usize,
    unit_id: UnitId,
}

impl MbapHeader {
    fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
        let mut cursor = ReadCursor::new(bytes);
        let tx_id = TxId::new(cursor.read_u16_be()?);
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;
        let unit_id = UnitId::new(cursor.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::MbapLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // must be > 0 b/c the 1-byte unit identifier counts towards length
        if length == 0 {
            return Err(FrameParseError::MbapLengthZero.into());
        }

        Ok(MbapHeader {
            tx_id,
            adu_length: length - 1,
            unit_id,
        })
    }
}

/// Reads complete MBAP frames: exactly 7 header bytes, then exactly the announced PDU
pub(crate) struct FramedReader {
    decode: AduDecodeLevel,
}

impl FramedReader {
    pub(crate) fn new(decode: AduDecodeLevel) -> Self {
        Self { decode }
    }

    pub(crate) async fn next_frame(&mut self, io: &mut PhysLayer) -> Result<Frame, RequestError> {
        let mut header = [0u8; constants::HEADER_LENGTH];
        io.read_exact(&mut header).await?;
        let mbap = MbapHeader::parse(&header)?;

        let mut frame = Frame::new(FrameHeader::new(mbap.unit_id, mbap.tx_id));
        io.read_exact(frame.body_mut(mbap.adu_length)?).await?;

        if self.decode.enabled() {
            tracing::info!(
                "MBAP RX - {}",
                MbapDisplay::new(self.decode, frame.header, frame.payload())
            );
        }

        Ok(frame)
    }
}

/// Formats complete MBAP frames into an internal buffer
pub(crate) struct FrameWriter {
    decode: AduDecodeLevel,
    buffer: [u8; constants::MAX_FRAME_LENGTH],
}

impl FrameWriter {
    pub(crate) fn new(decode: AduDecodeLevel) -> Self {
        Self {
            decode,
            buffer: [0; constants::MAX_FRAME_LENGTH],
        }
    }

    pub(crate) fn format(
        &mut self,
        header: FrameHeader,
        msg: &dyn Serialize,
    ) -> Result<&[u8], InternalError> {
        let mut cursor = WriteCursor::new(self.buffer.as_mut());
        cursor.write_u16_be(header.tx_id.to_u16())?;
        cursor.write_u16_be(0)?;
        cursor.seek_from_current(2)?; // write the length later
        cursor.write_u8(header.unit_id.value)?;

        let adu_length: usize = {
            let start = cursor.position();
            msg.serialize(&mut cursor)?;
            cursor.position() - start
        };

        if adu_length > constants::MAX_ADU_LENGTH {
            return Err(InternalError::FrameTooBig(
                adu_length,
                constants::MAX_ADU_LENGTH,
            ));
        }

        {
            // write the resulting length
            let frame_length_value = u16::try_from(adu_length + 1)
                .map_err(|_| InternalError::FrameTooBig(adu_length, constants::MAX_ADU_LENGTH))?;
            cursor.seek_from_start(4)?;
            cursor.write_u16_be(frame_length_value)?;
        }

        let total_length = constants::HEADER_LENGTH + adu_length;
        let frame = &self.buffer[..total_length];

        if self.decode.enabled() {
            tracing::info!(
                "MBAP TX - {}",
                MbapDisplay::new(self.decode, header, &frame[constants::HEADER_LENGTH..])
            );
        }

        Ok(frame)
    }
}

struct MbapDisplay<'a> {
    level: AduDecodeLevel,
    header: FrameHeader,
    payload: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    fn new(level: AduDecodeLevel, header: FrameHeader, payload: &'a [u8]) -> Self {
        MbapDisplay {
            level,
            header,
            payload,
        }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} len: {}", self.header, self.payload.len())?;
        if self.level.payload_enabled() {
            format_bytes(f, self.payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    //                            |   tx id  |  proto id |  length  | unit |  payload   |
    const SIMPLE_FRAME: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x2A, 0x03, 0x04];

    struct MockMessage {
        a: u8,
        b: u8,
    }

    impl Serialize for MockMessage {
        fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
            cursor.write_u8(self.a)?;
            cursor.write_u8(self.b)
        }
    }

    fn assert_equals_simple_frame(frame: &Frame) {
        assert_eq!(frame.header.tx_id, TxId::new(0x0007));
        assert_eq!(frame.header.unit_id, UnitId::new(0x2A));
        assert_eq!(frame.payload(), &[0x03, 0x04]);
    }

    async fn test_segmented_parse(split_at: usize) {
        let (f1, f2) = SIMPLE_FRAME.split_at(split_at);
        let mut io = PhysLayer::new_mock(Builder::new().read(f1).read(f2).build());
        let mut reader = FramedReader::new(AduDecodeLevel::Nothing);
        let frame = reader.next_frame(&mut io).await.unwrap();

        assert_equals_simple_frame(&frame);
    }

    async fn test_error(input: &[u8]) -> RequestError {
        let mut io = PhysLayer::new_mock(Builder::new().read(input).build());
        let mut reader = FramedReader::new(AduDecodeLevel::Nothing);
        reader.next_frame(&mut io).await.err().unwrap()
    }

    #[test]
    fn tx_id_starts_at_zero_and_wraps() {
        let mut tx_id = TxId::default();
        assert_eq!(tx_id.next(), TxId::new(0));
        assert_eq!(tx_id.next(), TxId::new(1));

        let mut tx_id = TxId::new(u16::MAX);
        assert_eq!(tx_id.next(), TxId::new(u16::MAX));
        assert_eq!(tx_id.next(), TxId::new(0));
    }

    #[test]
    fn correctly_formats_frame() {
        let mut writer = FrameWriter::new(AduDecodeLevel::Nothing);
        let msg = MockMessage { a: 0x03, b: 0x04 };
        let output = writer
            .format(FrameHeader::new(UnitId::new(42), TxId::new(7)), &msg)
            .unwrap();

        assert_eq!(output, SIMPLE_FRAME)
    }

    #[tokio::test]
    async fn can_parse_frame_from_stream() {
        let mut io = PhysLayer::new_mock(Builder::new().read(SIMPLE_FRAME).build());
        let mut reader = FramedReader::new(AduDecodeLevel::Nothing);
        let frame = reader.next_frame(&mut io).await.unwrap();

        assert_equals_simple_frame(&frame);
    }

    #[tokio::test]
    async fn can_parse_maximum_size_frame() {
        // maximum ADU length is 253, so max MBAP length value is 254 which is 0xFE
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFE, 0x2A];
        let payload = &[0xCC; 253];

        let mut io = PhysLayer::new_mock(Builder::new().read(header).read(payload).build());
        let mut reader = FramedReader::new(AduDecodeLevel::Nothing);
        let frame = reader.next_frame(&mut io).await.unwrap();

        assert_eq!(frame.payload(), payload.as_ref());
    }

    #[tokio::test]
    async fn can_parse_frame_if_segmented_in_header() {
        test_segmented_parse(4).await;
    }

    #[tokio::test]
    async fn can_parse_frame_if_segmented_in_payload() {
        test_segmented_parse(8).await;
    }

    #[tokio::test]
    async fn can_parse_frame_delivered_one_byte_at_a_time() {
        let mut builder = Builder::new();
        for byte in SIMPLE_FRAME {
            builder.read(std::slice::from_ref(byte));
        }
        let mut io = PhysLayer::new_mock(builder.build());
        let mut reader = FramedReader::new(AduDecodeLevel::Nothing);
        let frame = reader.next_frame(&mut io).await.unwrap();

        assert_equals_simple_frame(&frame);
    }

    #[tokio::test]
    async fn errors_on_bad_protocol_id() {
        let frame = &[0x00, 0x07, 0xCA, 0xFE, 0x00, 0x01, 0x2A];
        assert_eq!(
            test_error(frame).await,
            RequestError::BadFrame(FrameParseError::UnknownProtocolId(0xCAFE))
        );
    }

    #[tokio::test]
    async fn errors_on_length_of_zero() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert_eq!(
            test_error(frame).await,
            RequestError::BadFrame(FrameParseError::MbapLengthZero)
        );
    }

    #[tokio::test]
    async fn errors_when_mbap_length_too_big() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFF, 0x2A];
        assert_eq!(
            test_error(frame).await,
            RequestError::BadFrame(FrameParseError::MbapLengthTooBig(
                0xFF,
                constants::MAX_LENGTH_FIELD
            ))
        );
    }

    #[tokio::test]
    async fn errors_when_peer_closes_inside_the_payload() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x2A, 0x03];
        assert_eq!(
            test_error(frame).await,
            RequestError::Io(std::io::ErrorKind::UnexpectedEof)
        );
    }
}
