pub(crate) mod emulated;
pub(crate) mod engine;
pub(crate) mod model;
pub(crate) mod window;

pub use emulated::*;
pub use engine::*;
pub use model::*;
