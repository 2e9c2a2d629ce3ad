use std::sync::{Arc, Mutex};

use crate::constants::layout::{HR_NUM_SLOTS, MAX_COILS, MAX_HOLDS};
use crate::constants::limits::{MAX_READ_COILS_COUNT, MAX_READ_REGISTERS_COUNT};
use crate::exception::ExceptionCode;
use crate::types::{AddressRange, Indexed};

/// Register file shared between the server and the slot scheduler
pub type SharedRegisterFile = Arc<Mutex<RegisterFile>>;

/// Address space of the emulated PLC
///
/// Fixed-size coil and holding register arrays, zero at startup. The Modbus
/// facing operations validate their arguments and report failures as
/// exception codes. The plain accessors are used by the emulator itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    coils: Vec<bool>,
    holding: Vec<u16>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Create a zeroed register file
    pub fn new() -> Self {
        Self {
            coils: vec![false; MAX_COILS],
            holding: vec![0; MAX_HOLDS],
        }
    }

    /// Move the register file behind the lock shared by the server and the scheduler
    pub fn wrap(self) -> SharedRegisterFile {
        Arc::new(Mutex::new(self))
    }

    /// value of a coil, `None` if out of range
    pub fn coil(&self, address: u16) -> Option<bool> {
        self.coils.get(address as usize).copied()
    }

    /// value of a holding register, `None` if out of range
    pub fn holding(&self, address: u16) -> Option<u16> {
        self.holding.get(address as usize).copied()
    }

    /// Set a coil, returning false if out of range
    pub fn set_coil(&mut self, address: u16, value: bool) -> bool {
        match self.coils.get_mut(address as usize) {
            Some(coil) => {
                *coil = value;
                true
            }
            None => false,
        }
    }

    /// Set a holding register, bypassing the read-only rule. Returns false if out of range
    pub fn set_holding(&mut self, address: u16, value: u16) -> bool {
        match self.holding.get_mut(address as usize) {
            Some(register) => {
                *register = value;
                true
            }
            None => false,
        }
    }

    /// Read a range of coils on behalf of a client
    pub fn read_coils(&self, range: AddressRange) -> Result<&[bool], ExceptionCode> {
        get_range_of(&self.coils, range, MAX_READ_COILS_COUNT)
    }

    /// Read a range of holding registers on behalf of a client
    pub fn read_holding_registers(&self, range: AddressRange) -> Result<&[u16], ExceptionCode> {
        get_range_of(&self.holding, range, MAX_READ_REGISTERS_COUNT)
    }

    /// Write a coil on behalf of a client, returning the stored value
    pub fn write_coil(&mut self, value: Indexed<bool>) -> Result<Indexed<bool>, ExceptionCode> {
        if !self.set_coil(value.index, value.value) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(value)
    }

    /// Write a holding register on behalf of a client, returning the stored value
    ///
    /// The number of slots is read-only: writes to it succeed without effect
    /// and echo the unchanged value.
    pub fn write_register(&mut self, value: Indexed<u16>) -> Result<Indexed<u16>, ExceptionCode> {
        let register = self
            .holding
            .get_mut(value.index as usize)
            .ok_or(ExceptionCode::IllegalDataAddress)?;

        if value.index == HR_NUM_SLOTS {
            tracing::debug!("ignoring write to read-only register {}", value.index);
        } else {
            *register = value.value;
        }

        Ok(Indexed::new(value.index, *register))
    }
}

/// Retrieves a sub-slice or returns an ExceptionCode
///
/// The address check comes first, so an oversized request that also exceeds
/// the address space is reported as an illegal address.
fn get_range_of<T>(slice: &[T], range: AddressRange, limit: u16) -> Result<&[T], ExceptionCode> {
    if !range.fits_within(slice.len()) {
        tracing::warn!("{} exceeds the register file ({})", range, slice.len());
        return Err(ExceptionCode::IllegalDataAddress);
    }
    if let Err(err) = range.limited_count(limit) {
        tracing::warn!("invalid range: {}", err);
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(&slice[range.to_std_range()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, count: u16) -> AddressRange {
        AddressRange { start, count }
    }

    #[test]
    fn starts_zeroed() {
        let file = RegisterFile::new();
        assert_eq!(file.read_coils(range(0, 2000)).unwrap(), &[false; 2000][..]);
        assert_eq!(file.read_holding_registers(range(8067, 125)).unwrap(), &[0; 125][..]);
    }

    #[test]
    fn rejects_ranges_beyond_capacity() {
        let file = RegisterFile::new();
        assert_eq!(
            file.read_coils(range(4095, 2)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            file.read_holding_registers(range(8192, 1)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            file.read_coils(range(u16::MAX, u16::MAX)),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn rejects_zero_and_oversized_counts() {
        let file = RegisterFile::new();
        assert_eq!(
            file.read_coils(range(0, 0)),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            file.read_coils(range(0, 2001)),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            file.read_holding_registers(range(0, 126)),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn single_writes_are_bounds_checked() {
        let mut file = RegisterFile::new();
        assert_eq!(
            file.write_coil(Indexed::new(4096, true)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            file.write_register(Indexed::new(8192, 7)),
            Err(ExceptionCode::IllegalDataAddress)
        );

        assert_eq!(
            file.write_coil(Indexed::new(4095, true)),
            Ok(Indexed::new(4095, true))
        );
        assert_eq!(
            file.write_register(Indexed::new(105, 42)),
            Ok(Indexed::new(105, 42))
        );
        assert_eq!(file.coil(4095), Some(true));
        assert_eq!(file.holding(105), Some(42));
    }

    #[test]
    fn slot_count_is_read_only_but_echoes() {
        let mut file = RegisterFile::new();
        file.set_holding(HR_NUM_SLOTS, 16);
        assert_eq!(
            file.write_register(Indexed::new(HR_NUM_SLOTS, 3)),
            Ok(Indexed::new(HR_NUM_SLOTS, 16))
        );
        assert_eq!(file.holding(HR_NUM_SLOTS), Some(16));
    }
}
