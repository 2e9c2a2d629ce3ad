use crate::common::function::ERROR_BIT;
use crate::common::pdu::{Reply, Request, RequestParseError};
use crate::exception::ExceptionCode;
use crate::server::register_file::SharedRegisterFile;
use crate::types::UnitId;

/// Answers decoded requests from the shared register file
#[derive(Clone, Debug)]
pub(crate) struct RequestHandler {
    unit_id: UnitId,
    registers: SharedRegisterFile,
}

impl RequestHandler {
    pub(crate) fn new(unit_id: UnitId, registers: SharedRegisterFile) -> Self {
        Self { unit_id, registers }
    }

    /// Produce the reply to a request PDU, or `None` if nothing can be answered
    pub(crate) fn handle(&self, unit_id: UnitId, pdu: &[u8]) -> Option<Reply> {
        let raw_function = match pdu.first() {
            Some(x) => *x,
            None => {
                tracing::warn!("received request without a function code");
                return None;
            }
        };

        if unit_id != self.unit_id {
            tracing::warn!("received request for unit {}, serving {}", unit_id, self.unit_id);
            return Some(Reply::Exception {
                function: raw_function | ERROR_BIT,
                exception: ExceptionCode::GatewayTargetDeviceFailedToRespond,
            });
        }

        let request = match Request::parse(pdu) {
            Ok(request) => request,
            Err(RequestParseError::Empty) => return None,
            Err(RequestParseError::Exception {
                function,
                exception,
            }) => {
                tracing::warn!("rejecting request with function {:#04X}: {}", raw_function, exception);
                return Some(Reply::Exception {
                    function,
                    exception,
                });
            }
        };

        let function = request.function();

        let mut registers = match self.registers.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::error!("register file lock is poisoned");
                return Some(Reply::exception(
                    function,
                    ExceptionCode::ServerDeviceFailure,
                ));
            }
        };

        let result = match request {
            Request::ReadCoils(range) => registers
                .read_coils(range)
                .map(|values| Reply::ReadCoils(values.to_vec())),
            Request::ReadHoldingRegisters(range) => registers
                .read_holding_registers(range)
                .map(|values| Reply::ReadHoldingRegisters(values.to_vec())),
            Request::WriteSingleCoil(value) => {
                registers.write_coil(value).map(Reply::WriteSingleCoil)
            }
            Request::WriteSingleRegister(value) => registers
                .write_register(value)
                .map(Reply::WriteSingleRegister),
        };

        Some(result.unwrap_or_else(|ex| Reply::exception(function, ex)))
    }
}
