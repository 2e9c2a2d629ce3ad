/// request dispatch
pub(crate) mod handler;
/// emulator address space
pub(crate) mod register_file;
pub(crate) mod task;

pub use register_file::*;
