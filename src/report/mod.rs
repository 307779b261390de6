//! Report module - terminal summaries and the JSON run report

pub mod export;
pub mod summary;

pub use export::*;
pub use summary::*;
