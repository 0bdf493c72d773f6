//! Subscriber set-up for binaries and tests
//!
//! Library code only emits `tracing` events; whoever owns `main` decides
//! where they go by calling [`init_tracing`].

pub mod config;
pub mod init;

pub use config::InstrumentationConfig;
pub use init::{init_default, init_tracing};
