//! # PrefixKV Client
//!
//! Purpose: Expose a compact, blocking API for issuing PrefixKV commands
//! over the binary protocol, with pooled connections and transparent
//! decompression of compressed values.

mod client;
mod pool;

pub use client::{Client, ClientConfig, ClientError, ClientResult, Datum};
