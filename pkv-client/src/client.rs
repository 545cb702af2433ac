//! # Blocking Client API
//!
//! Purpose: Expose one method per opcode over pooled connections, decoding
//! replies into typed results.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling and framing details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Transparent Decompression**: Compressed values decode on read; the
//!    caller always sees the original bytes.
//! 4. **Fail Fast**: Server error codes surface as typed errors.

use std::fmt;
use std::time::Duration;

use pkv_common::wire::{self, WireReply};
use pkv_common::{codec, OpCode, ReplyCode, ValueEncoding};

use crate::pool::{ConnectionPool, PoolConfig};

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// Framing or reply parse error.
    Protocol,
    /// Server replied with an error code.
    Server(ReplyCode),
    /// Response shape did not match the issued command.
    UnexpectedReply,
    /// A value payload failed to decode (codec frame or number width).
    Corrupt,
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be resolved into a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::Server(code) => write!(f, "server error: {:?}", code),
            ClientError::UnexpectedReply => write!(f, "unexpected reply"),
            ClientError::Corrupt => write!(f, "corrupt value payload"),
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

/// Decoded server value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    /// Raw bytes; compressed values arrive here already decoded.
    Bytes(Vec<u8>),
    /// Inline integer.
    Number(i64),
}

impl Datum {
    /// The byte form, when this is a byte value.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Datum::Bytes(data) => Some(data),
            Datum::Number(_) => None,
        }
    }

    /// The integer form, when this is a number.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Datum::Number(value) => Some(*value),
            Datum::Bytes(_) => None,
        }
    }
}

/// Configuration for the client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:10128".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:10128".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Blocking client with connection pooling.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool; a connection that saw an error is discarded.
pub struct Client {
    pool: ConnectionPool,
}

impl Client {
    /// Creates a client with default configuration for `addr`.
    pub fn connect(addr: impl Into<String>) -> Self {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        });
        Client { pool }
    }

    fn exec(&self, op: OpCode, payload: &[u8]) -> ClientResult<WireReply> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(op, payload) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                conn.discard();
                Err(err)
            }
        }
    }

    /// Stores `value` under `key`; `ttl <= 0` disables expiry. Returns the
    /// stored value as the server sees it.
    pub fn set(&self, ttl: i64, key: &[u8], value: &[u8]) -> ClientResult<Datum> {
        let mut payload = ttl.to_string().into_bytes();
        payload.push(b' ');
        payload.extend_from_slice(key);
        payload.push(b' ');
        payload.extend_from_slice(value);
        expect_value(self.exec(OpCode::Set, &payload)?)
    }

    /// Fetches a value; `Ok(None)` when the key is missing or expired.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Datum>> {
        match self.exec(OpCode::Get, key)? {
            WireReply::Code(ReplyCode::NotFound) => Ok(None),
            reply => expect_value(reply).map(Some),
        }
    }

    /// Deletes a key. Returns false when the key was missing.
    pub fn del(&self, key: &[u8]) -> ClientResult<bool> {
        match self.exec(OpCode::Del, key)? {
            WireReply::Code(ReplyCode::Ok) => Ok(true),
            WireReply::Code(ReplyCode::NotFound) => Ok(false),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Sets a key's ttl. Returns false when the key was missing.
    pub fn ttl(&self, key: &[u8], secs: i64) -> ClientResult<bool> {
        let payload = key_and_long(key, secs);
        match self.exec(OpCode::Ttl, &payload)? {
            WireReply::Code(ReplyCode::Ok) => Ok(true),
            WireReply::Code(ReplyCode::NotFound) => Ok(false),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Increments a counter, creating it at 1 when missing.
    pub fn inc(&self, key: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::Inc, key)?)
    }

    /// Decrements a counter, creating it at 1 when missing.
    pub fn dec(&self, key: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::Dec, key)?)
    }

    /// Locks a key for `secs` seconds (-1 = permanently).
    pub fn lock(&self, key: &[u8], secs: i64) -> ClientResult<()> {
        let payload = key_and_long(key, secs);
        match self.exec(OpCode::Lock, &payload)? {
            WireReply::Code(ReplyCode::Ok) => Ok(()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Unlocks a key regardless of its lock state. Returns false when the
    /// key was missing.
    pub fn unlock(&self, key: &[u8]) -> ClientResult<bool> {
        match self.exec(OpCode::Unlock, key)? {
            WireReply::Code(ReplyCode::Ok) => Ok(true),
            WireReply::Code(ReplyCode::NotFound) => Ok(false),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Reads one item metadata field; `Ok(None)` when the key is missing.
    pub fn meta(&self, key: &[u8], field: &str) -> ClientResult<Option<i64>> {
        let mut payload = key.to_vec();
        payload.push(b' ');
        payload.extend_from_slice(field.as_bytes());
        match self.exec(OpCode::Meta, &payload)? {
            WireReply::Code(ReplyCode::NotFound) => Ok(None),
            reply => expect_number(reply).map(Some),
        }
    }

    /// Lists keys matching the prefix expression, in index order.
    pub fn keys(&self, expr: &[u8]) -> ClientResult<Vec<Vec<u8>>> {
        match self.exec(OpCode::Keys, expr)? {
            WireReply::KvSet(pairs) => Ok(pairs.into_iter().map(|(_, _, key)| key).collect()),
            WireReply::Code(ReplyCode::NotFound) => Ok(Vec::new()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Counts live keys matching the prefix expression.
    pub fn count(&self, expr: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::Count, expr)?)
    }

    /// Fetches the server stats rows, in server order.
    pub fn stats(&self) -> ClientResult<Vec<(String, String)>> {
        match self.exec(OpCode::Stats, b"")? {
            WireReply::KvSet(pairs) => Ok(pairs
                .into_iter()
                .map(|(key, _, value)| {
                    (
                        String::from_utf8_lossy(&key).into_owned(),
                        String::from_utf8_lossy(&value).into_owned(),
                    )
                })
                .collect()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Round-trip health check.
    pub fn ping(&self) -> ClientResult<()> {
        match self.exec(OpCode::Ping, b"")? {
            WireReply::Code(ReplyCode::Ok) => Ok(()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Fetches every live match of the prefix expression with its decoded
    /// value; empty when nothing matched.
    pub fn mget(&self, expr: &[u8]) -> ClientResult<Vec<(Vec<u8>, Datum)>> {
        match self.exec(OpCode::MGet, expr)? {
            WireReply::KvSet(pairs) => pairs
                .into_iter()
                .map(|(key, encoding, data)| decode_value(encoding, data).map(|v| (key, v)))
                .collect(),
            WireReply::Code(ReplyCode::NotFound) => Ok(Vec::new()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Rewrites every match of the prefix expression with `value`; returns
    /// the number of rewritten entries.
    pub fn mset(&self, expr: &[u8], value: &[u8]) -> ClientResult<i64> {
        let mut payload = expr.to_vec();
        payload.push(b' ');
        payload.extend_from_slice(value);
        expect_number(self.exec(OpCode::MSet, &payload)?)
    }

    /// Deletes every unlocked match; returns the removal count.
    pub fn mdel(&self, expr: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::MDel, expr)?)
    }

    /// Stamps a ttl on every unlocked match; returns the mutation count.
    pub fn mttl(&self, expr: &[u8], secs: i64) -> ClientResult<i64> {
        let payload = key_and_long(expr, secs);
        expect_number(self.exec(OpCode::MTtl, &payload)?)
    }

    /// Increments every numeric match; returns the mutation count.
    pub fn minc(&self, expr: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::MInc, expr)?)
    }

    /// Decrements every numeric match; returns the mutation count.
    pub fn mdec(&self, expr: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::MDec, expr)?)
    }

    /// Locks every unlocked match; returns the mutation count.
    pub fn mlock(&self, expr: &[u8], secs: i64) -> ClientResult<i64> {
        let payload = key_and_long(expr, secs);
        expect_number(self.exec(OpCode::MLock, &payload)?)
    }

    /// Unlocks every match regardless of lock state; returns the count.
    pub fn munlock(&self, expr: &[u8]) -> ClientResult<i64> {
        expect_number(self.exec(OpCode::MUnlock, expr)?)
    }

    /// Asks the server to close this connection after replying.
    pub fn quit(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let outcome = conn.exec(OpCode::End, b"");
        // the server closes this socket; never pool it again
        conn.discard();
        match outcome? {
            WireReply::Code(ReplyCode::Ok) => Ok(()),
            WireReply::Code(code) => Err(ClientError::Server(code)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }
}

fn key_and_long(key: &[u8], value: i64) -> Vec<u8> {
    let mut payload = key.to_vec();
    payload.push(b' ');
    payload.extend_from_slice(value.to_string().as_bytes());
    payload
}

fn decode_value(encoding: ValueEncoding, data: Vec<u8>) -> ClientResult<Datum> {
    match encoding {
        ValueEncoding::Plain => Ok(Datum::Bytes(data)),
        ValueEncoding::Compressed => codec::decompress(&data)
            .map(Datum::Bytes)
            .map_err(|_| ClientError::Corrupt),
        ValueEncoding::Number => wire::decode_number(&data)
            .map(Datum::Number)
            .map_err(|_| ClientError::Corrupt),
    }
}

fn expect_value(reply: WireReply) -> ClientResult<Datum> {
    match reply {
        WireReply::Value { encoding, data } => decode_value(encoding, data),
        WireReply::Code(code) => Err(ClientError::Server(code)),
        WireReply::KvSet(_) => Err(ClientError::UnexpectedReply),
    }
}

fn expect_number(reply: WireReply) -> ClientResult<i64> {
    match reply {
        WireReply::Value {
            encoding: ValueEncoding::Number,
            data,
        } => wire::decode_number(&data).map_err(|_| ClientError::Corrupt),
        WireReply::Value { .. } => Err(ClientError::UnexpectedReply),
        WireReply::Code(code) => Err(ClientError::Server(code)),
        WireReply::KvSet(_) => Err(ClientError::UnexpectedReply),
    }
}
