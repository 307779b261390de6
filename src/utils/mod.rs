//! Terminal output and logging helpers

pub mod logging;
pub mod progress;
pub mod styling;

pub use logging::init_logger;
pub use progress::*;
pub use styling::*;
