pub(crate) mod controller;
pub(crate) mod session;

pub use controller::*;
pub use session::*;
