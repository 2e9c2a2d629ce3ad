use std::fmt::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::decode::PhysDecodeLevel;
use crate::error::RequestError;

/// Byte stream under the Modbus framing
///
/// Every read and write is bounded by the optional timeout.
pub(crate) struct PhysLayer {
    layer: PhysLayerImpl,
    timeout: Option<Duration>,
    decode: PhysDecodeLevel,
}

// encapsulates all possible physical layers as an enum
pub(crate) enum PhysLayerImpl {
    Tcp(tokio::net::TcpStream),
    #[cfg(test)]
    Mock(tokio_test::io::Mock),
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.layer {
            PhysLayerImpl::Tcp(_) => f.write_str("Tcp"),
            #[cfg(test)]
            PhysLayerImpl::Mock(_) => f.write_str("Mock"),
        }
    }
}

impl PhysLayer {
    pub(crate) fn new_tcp(
        socket: tokio::net::TcpStream,
        timeout: Option<Duration>,
        decode: PhysDecodeLevel,
    ) -> Self {
        Self {
            layer: PhysLayerImpl::Tcp(socket),
            timeout,
            decode,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_mock(mock: tokio_test::io::Mock) -> Self {
        Self {
            layer: PhysLayerImpl::Mock(mock),
            timeout: None,
            decode: PhysDecodeLevel::Nothing,
        }
    }

    /// open a TCP connection, failing after `timeout` instead of hanging
    pub(crate) async fn connect(
        addr: SocketAddr,
        timeout: Duration,
        decode: PhysDecodeLevel,
    ) -> Result<Self, RequestError> {
        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await??;
        socket.set_nodelay(true)?;
        Ok(Self::new_tcp(socket, Some(timeout), decode))
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, RequestError> {
        let length = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_impl(buffer)).await??,
            None => self.read_impl(buffer).await?,
        };

        if self.decode.enabled() {
            if let Some(x) = buffer.get(0..length) {
                tracing::info!("PHYS RX - {}", PhysDisplay::new(self.decode, x))
            }
        }

        Ok(length)
    }

    async fn read_impl(&mut self, buffer: &mut [u8]) -> Result<usize, std::io::Error> {
        match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.read(buffer).await,
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.read(buffer).await,
        }
    }

    /// read until `buffer` is full, or fail if the peer closes first
    pub(crate) async fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), RequestError> {
        let mut pos = 0;
        while pos < buffer.len() {
            let count = self.read(&mut buffer[pos..]).await?;
            if count == 0 {
                return Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof));
            }
            pos += count;
        }
        Ok(())
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<(), RequestError> {
        if self.decode.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(self.decode, data));
        }

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.write_impl(data)).await??,
            None => self.write_impl(data).await?,
        }

        Ok(())
    }

    async fn write_impl(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.write_all(data).await,
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.write_all(data).await,
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn read_exact_accumulates_partial_reads() {
        let mut phys = PhysLayer::new_mock(
            Builder::new()
                .read(&[0x01])
                .read(&[0x02, 0x03])
                .read(&[0x04])
                .build(),
        );
        let mut buffer = [0u8; 4];
        phys.read_exact(&mut buffer).await.unwrap();
        assert_eq!(buffer, [0x01, 0x02, 0x03, 0x04]);
    }

    #[tokio::test]
    async fn read_exact_fails_on_early_close() {
        let mut phys = PhysLayer::new_mock(Builder::new().read(&[0x01, 0x02]).build());
        let mut buffer = [0u8; 4];
        assert_eq!(
            phys.read_exact(&mut buffer).await,
            Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof))
        );
    }

    #[tokio::test]
    async fn read_times_out() {
        let mut phys = PhysLayer::new_mock(
            Builder::new()
                .wait(Duration::from_millis(200))
                .read(&[0x01])
                .build(),
        );
        phys.timeout = Some(Duration::from_millis(10));
        let mut buffer = [0u8; 1];
        assert_eq!(
            phys.read_exact(&mut buffer).await,
            Err(RequestError::ResponseTimeout)
        );

        // the late byte is still delivered to the next read
        phys.timeout = None;
        phys.read_exact(&mut buffer).await.unwrap();
        assert_eq!(buffer, [0x01]);
    }
}
