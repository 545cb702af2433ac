//! # PrefixKV Server
//!
//! TCP front end for the query engine: frame the binary protocol, serialize
//! whole handler invocations behind one lock, and keep the engine clock
//! fresh from a periodic task.

mod config;
mod server;

pub use config::{Config, ConfigError, CronConfig, LimitsConfig, NetworkConfig};
pub use server::{Server, SharedEngine};
