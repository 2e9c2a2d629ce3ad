/// u16 representations of COILS when writing a single coil
pub(crate) mod coil {
    /// u16 value of ON
    pub(crate) const ON: u16 = 0xFF00;
    /// u16 value of OFF
    pub(crate) const OFF: u16 = 0x0000;
}

/// Limits of request sizes
pub mod limits {
    /// Maximum count allowed in a read coils request
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding registers request
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
}

/// Exception codes defined in the Modbus specification
pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SERVER_DEVICE_FAILURE: u8 = 0x04;
    pub(crate) const ACKNOWLEDGE: u8 = 0x05;
    pub(crate) const SERVER_DEVICE_BUSY: u8 = 0x06;
    pub(crate) const MEMORY_PARITY_ERROR: u8 = 0x08;
    pub(crate) const GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
    pub(crate) const GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: u8 = 0x0B;
}

/// Register map of the emulated PLC
///
/// All addresses are 0-based.
pub mod layout {
    /// Number of coils in the register file
    pub const MAX_COILS: usize = 4096;
    /// Number of holding registers in the register file
    pub const MAX_HOLDS: usize = 8192;
    /// Number of schedule slots
    pub const MAX_SLOTS: usize = 16;

    /// Coil `COIL_REMOTE_EN_BASE + i` is the remote enable flag of slot `i`
    pub const COIL_REMOTE_EN_BASE: u16 = 500;

    /// Heartbeat counter, incremented once per second
    pub const HR_HEARTBEAT: u16 = 0;
    /// Number of schedule slots (read-only)
    pub const HR_NUM_SLOTS: u16 = 1;
    /// First register of the slot parameter blocks
    pub const HR_SCHED_BASE: u16 = 100;
    /// Registers per slot parameter block
    pub const HR_SCHED_STRIDE: u16 = 10;

    /// Offsets within a slot parameter block
    pub mod slot {
        /// 0/1
        pub const ENABLED: u16 = 0;
        /// 0 = weekly, 1 = once
        pub const TYPE: u16 = 1;
        /// coil driven by the slot
        pub const AREA: u16 = 2;
        /// bit0 = Sunday .. bit6 = Saturday
        pub const DAYS: u16 = 3;
        /// minute of day
        pub const START: u16 = 4;
        /// minutes, 0 disables the slot
        pub const DURATION: u16 = 5;
        /// once only
        pub const YEAR: u16 = 6;
        /// once only
        pub const MONTH: u16 = 7;
        /// once only
        pub const DAY: u16 = 8;
        /// 0 = idle, 1 = active, 2 = consumed
        pub const STATUS: u16 = 9;
    }

    /// Address of a field in the parameter block of `slot`
    pub const fn slot_register(slot: usize, field: u16) -> u16 {
        HR_SCHED_BASE + (slot as u16) * HR_SCHED_STRIDE + field
    }

    /// Address of the remote enable coil of `slot`
    pub const fn remote_enable_coil(slot: usize) -> usize {
        COIL_REMOTE_EN_BASE as usize + slot
    }
}
