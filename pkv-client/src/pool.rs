//! # Connection Pool
//!
//! Purpose: Reuse TCP connections for the blocking client to reduce
//! handshake latency and allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Discard on Doubt**: A connection that saw an error never returns to
//!    the idle set.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pkv_common::wire::{self, WireReply};
use pkv_common::OpCode;

use crate::client::{ClientError, ClientResult};

/// Largest reply body the client will read.
const MAX_REPLY: usize = 64 * 1024 * 1024;

/// Pool configuration for the blocking client.
#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:10128".
    pub addr: String,
    /// Maximum number of idle connections to keep.
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

/// One framed-protocol connection with a reusable read buffer.
pub(crate) struct Connection {
    stream: TcpStream,
    read_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let addr = config
            .addr
            .to_socket_addrs()
            .map_err(ClientError::Io)?
            .next()
            .ok_or(ClientError::InvalidAddress)?;
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Ok(Connection {
            stream,
            read_buf: Vec::new(),
        })
    }

    /// Writes one request frame and reads one reply frame.
    pub(crate) fn exec(&mut self, op: OpCode, payload: &[u8]) -> ClientResult<WireReply> {
        let mut frame = Vec::with_capacity(6 + payload.len());
        frame.extend_from_slice(&((2 + payload.len()) as u32).to_le_bytes());
        wire::encode_request(op, payload, &mut frame);
        self.stream.write_all(&frame)?;
        self.stream.flush()?;

        let mut head = [0u8; 4];
        self.stream.read_exact(&mut head)?;
        let len = u32::from_le_bytes(head) as usize;
        if len > MAX_REPLY {
            return Err(ClientError::Protocol);
        }
        self.read_buf.resize(len, 0);
        self.stream.read_exact(&mut self.read_buf)?;
        wire::decode_reply(&self.read_buf).map_err(|_| ClientError::Protocol)
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle.
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    pub(crate) fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Hands out an idle connection, or dials a new one within the limit.
    pub(crate) fn acquire(&self) -> ClientResult<PooledConnection> {
        {
            let mut state = self.lock_state();
            if let Some(conn) = state.idle.pop_front() {
                return Ok(self.guard(conn));
            }
            if state.total >= self.inner.config.max_total {
                return Err(ClientError::PoolExhausted);
            }
            state.total += 1;
        }
        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(self.guard(conn)),
            Err(err) => {
                self.lock_state().total -= 1;
                Err(err)
            }
        }
    }

    fn guard(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            inner: Arc::clone(&self.inner),
            discard: false,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // the pool holds no invariant that a panicked holder could break
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Borrowed pool connection; returns to the idle set on drop unless
/// discarded.
pub(crate) struct PooledConnection {
    conn: Option<Connection>,
    inner: Arc<PoolInner>,
    discard: bool,
}

impl PooledConnection {
    /// Executes one request/reply exchange.
    pub(crate) fn exec(&mut self, op: OpCode, payload: &[u8]) -> ClientResult<WireReply> {
        match self.conn.as_mut() {
            Some(conn) => conn.exec(op, payload),
            None => Err(ClientError::Protocol),
        }
    }

    /// Marks the connection as unusable; it will be dropped, not pooled.
    pub(crate) fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut state = match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.conn.take() {
            Some(conn) if !self.discard && state.idle.len() < self.inner.config.max_idle => {
                state.idle.push_back(conn);
            }
            _ => {
                state.total = state.total.saturating_sub(1);
            }
        }
    }
}
