use std::fmt::{Display, Formatter};

mod constants {
    pub(crate) const READ_COILS: u8 = 1;
    pub(crate) const READ_HOLDING_REGISTERS: u8 = 3;
    pub(crate) const WRITE_SINGLE_COIL: u8 = 5;
    pub(crate) const WRITE_SINGLE_REGISTER: u8 = 6;
}

pub(crate) const ERROR_BIT: u8 = 0x80;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FunctionCode {
    ReadCoils = constants::READ_COILS,
    ReadHoldingRegisters = constants::READ_HOLDING_REGISTERS,
    WriteSingleCoil = constants::WRITE_SINGLE_COIL,
    WriteSingleRegister = constants::WRITE_SINGLE_REGISTER,
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            FunctionCode::ReadCoils => write!(f, "READ COILS ({:#04X})", self.get_value()),
            FunctionCode::ReadHoldingRegisters => {
                write!(f, "READ HOLDING REGISTERS ({:#04X})", self.get_value())
            }
            FunctionCode::WriteSingleCoil => {
                write!(f, "WRITE SINGLE COIL ({:#04X})", self.get_value())
            }
            FunctionCode::WriteSingleRegister => {
                write!(f, "WRITE SINGLE REGISTER ({:#04X})", self.get_value())
            }
        }
    }
}

impl FunctionCode {
    pub(crate) const fn get_value(self) -> u8 {
        self as u8
    }

    pub(crate) const fn as_error(self) -> u8 {
        self.get_value() | ERROR_BIT
    }

    pub(crate) fn get(value: u8) -> Option<Self> {
        match value {
            constants::READ_COILS => Some(FunctionCode::ReadCoils),
            constants::READ_HOLDING_REGISTERS => Some(FunctionCode::ReadHoldingRegisters),
            constants::WRITE_SINGLE_COIL => Some(FunctionCode::WriteSingleCoil),
            constants::WRITE_SINGLE_REGISTER => Some(FunctionCode::WriteSingleRegister),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_four_supported_codes_are_known() {
        for value in 0..=u8::MAX {
            let expected = matches!(value, 0x01 | 0x03 | 0x05 | 0x06);
            assert_eq!(FunctionCode::get(value).is_some(), expected, "{value}");
        }
    }

    #[test]
    fn error_code_sets_high_bit() {
        assert_eq!(FunctionCode::WriteSingleRegister.as_error(), 0x86);
    }
}
