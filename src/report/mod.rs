//! Report module - terminal summaries, output tables and JSON export

pub mod export;
pub mod output;
pub mod summary;

pub use export::*;
pub use output::*;
pub use summary::*;
