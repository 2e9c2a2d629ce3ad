use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::common::frame::{Frame, FrameWriter, FramedReader};
use crate::common::pdu::{Reply, ReplyDisplay};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::server::handler::RequestHandler;
use crate::shutdown::ShutdownSignal;

/// Accepts one connection at a time and serves it to completion
pub(crate) struct ServerTask {
    listener: TcpListener,
    handler: RequestHandler,
    decode: DecodeLevel,
}

impl ServerTask {
    pub(crate) fn new(listener: TcpListener, handler: RequestHandler, decode: DecodeLevel) -> Self {
        Self {
            listener,
            handler,
            decode,
        }
    }

    pub(crate) async fn run(&mut self, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.requested() => {
                    tracing::info!("server shutdown");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Err(err) => {
                            tracing::error!("error accepting connection: {}", err);
                            return;
                        }
                        Ok((socket, addr)) => {
                            self.serve(socket, addr, &mut shutdown).await;
                        }
                    }
                }
            }
        }
    }

    async fn serve(&self, socket: TcpStream, addr: SocketAddr, shutdown: &mut ShutdownSignal) {
        tracing::info!("accepted connection from: {}", addr);

        if let Err(err) = socket.set_nodelay(true) {
            tracing::warn!("unable to disable Nagle's algorithm: {}", err);
        }

        let phys = PhysLayer::new_tcp(socket, None, self.decode.physical);
        let result = SessionTask::new(phys, &self.handler, self.decode)
            .run(shutdown)
            .instrument(tracing::info_span!("Session", "remote" = ?addr))
            .await;

        match result {
            Ok(()) => tracing::info!("session with {} closed", addr),
            Err(err) => tracing::info!("session with {} ended: {}", addr, err),
        }
    }
}

/// Sequential request/response loop over a single connection
pub(crate) struct SessionTask<'a> {
    phys: PhysLayer,
    handler: &'a RequestHandler,
    reader: FramedReader,
    writer: FrameWriter,
    decode: DecodeLevel,
}

impl<'a> SessionTask<'a> {
    pub(crate) fn new(phys: PhysLayer, handler: &'a RequestHandler, decode: DecodeLevel) -> Self {
        Self {
            phys,
            handler,
            reader: FramedReader::new(decode.adu),
            writer: FrameWriter::new(decode.adu),
            decode,
        }
    }

    /// Serve requests until the peer disconnects, a frame is malformed or shutdown is requested
    pub(crate) async fn run(&mut self, shutdown: &mut ShutdownSignal) -> Result<(), RequestError> {
        loop {
            tokio::select! {
                _ = shutdown.requested() => {
                    return Ok(());
                }
                frame = self.reader.next_frame(&mut self.phys) => {
                    self.reply(frame?).await?;
                }
            }
        }
    }

    async fn reply(&mut self, frame: Frame) -> Result<(), RequestError> {
        let reply = match self.handler.handle(frame.header.unit_id, frame.payload()) {
            Some(reply) => reply,
            None => return Ok(()),
        };

        if self.decode.pdu.enabled() {
            tracing::info!("PDU TX - {}", ReplyDisplay::new(self.decode.pdu, &reply));
        }

        let bytes = match self.writer.format(frame.header, &reply) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("unable to serialize reply: {}", err);
                let function = frame.payload().first().copied().unwrap_or_default();
                let failure = Reply::Exception {
                    function: function | crate::common::function::ERROR_BIT,
                    exception: ExceptionCode::ServerDeviceFailure,
                };
                self.writer.format(frame.header, &failure)?
            }
        };

        self.phys.write(bytes).await
    }
}
