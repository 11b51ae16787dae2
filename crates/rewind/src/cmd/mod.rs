//! Command modules for the Rewind CLI

pub mod config;
pub mod inspect;
pub mod replay;

pub use config::load_engine_config;
pub use inspect::inspect_trace;
pub use replay::{replay_trace, ReplayOptions};
