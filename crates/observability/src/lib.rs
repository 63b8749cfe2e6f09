//! Process-wide tracing setup shared by the warehouse binaries.

pub mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
