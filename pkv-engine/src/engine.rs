//! Engine state and request dispatch.

use pkv_common::{codec, OpCode, ReplyCode, ValueEncoding};
use thiserror::Error;

use crate::index::PrefixIndex;
use crate::item::{Item, ItemData};
use crate::pool::ItemPool;
use crate::reply::ReplySink;
use crate::stats::EngineStats;

/// Engine limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest key (and prefix expression) accepted; longer input truncates.
    pub max_key_size: usize,
    /// Longest value accepted; longer input truncates.
    pub max_value_size: usize,
    /// Ceiling applied to every item ttl, seconds.
    pub max_item_ttl: i64,
    /// Write gate: SET/MSET fail once `memused` exceeds this many bytes.
    pub max_memory: u64,
    /// Values longer than this many bytes are candidates for compression.
    pub compression: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_key_size: 255,
            max_value_size: 1024 * 1024,
            max_item_ttl: 30 * 24 * 3600,
            max_memory: 128 * 1024 * 1024,
            compression: 512,
        }
    }
}

/// Dispatcher-level failures.
///
/// These never produce a reply; the host treats them as protocol violations
/// and drops the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("request shorter than the opcode header")]
    ShortRequest,
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
}

/// The query engine: prefix index, pool accounting, counters, and the
/// compression scratch buffer. One instance per process; the host serializes
/// whole dispatches.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) index: PrefixIndex,
    pub(crate) pool: ItemPool,
    pub(crate) stats: EngineStats,
    pub(crate) scratch: Vec<u8>,
}

impl Engine {
    /// Builds an engine anchored at wall-clock second `now`.
    pub fn new(config: EngineConfig, now: u64) -> Self {
        let stats = EngineStats {
            time: now,
            started: now,
            ..EngineStats::default()
        };
        Engine {
            config,
            index: PrefixIndex::new(),
            pool: ItemPool::new(),
            stats,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Number of indexed items, for invariant checks.
    pub fn item_count(&self) -> usize {
        self.index.len()
    }

    /// Cron hook: refreshes the engine clock.
    pub fn tick(&mut self, now: u64) {
        self.stats.time = now;
        self.stats.crondone += 1;
    }

    /// Accounts one accepted client connection.
    pub fn client_connected(&mut self) {
        self.stats.nclients += 1;
        self.stats.connections += 1;
    }

    /// Accounts one closed client connection.
    pub fn client_disconnected(&mut self) {
        self.stats.nclients = self.stats.nclients.saturating_sub(1);
    }

    /// Routes one request buffer (two-byte little-endian opcode, then the
    /// payload) to its handler. Every handled request enqueues exactly one
    /// reply on `sink`.
    pub fn dispatch(
        &mut self,
        request: &[u8],
        sink: &mut dyn ReplySink,
    ) -> Result<(), EngineError> {
        if request.len() < 2 {
            return Err(EngineError::ShortRequest);
        }
        let raw = u16::from_le_bytes([request[0], request[1]]);
        let op = OpCode::from_u16(raw).ok_or(EngineError::UnknownOpcode(raw))?;
        self.stats.requests += 1;
        let payload = &request[2..];
        match op {
            OpCode::Get => self.op_get(payload, sink),
            OpCode::Set => self.op_set(payload, sink),
            OpCode::Del => self.op_del(payload, sink),
            OpCode::Ttl => self.op_ttl(payload, sink),
            OpCode::Inc => self.op_incr(payload, 1, sink),
            OpCode::Dec => self.op_incr(payload, -1, sink),
            OpCode::Lock => self.op_lock(payload, sink),
            OpCode::Unlock => self.op_unlock(payload, sink),
            OpCode::MGet => self.op_mget(payload, sink),
            OpCode::MSet => self.op_mset(payload, sink),
            OpCode::MDel => self.op_mdel(payload, sink),
            OpCode::MTtl => self.op_mttl(payload, sink),
            OpCode::MInc => self.op_mincr(payload, 1, sink),
            OpCode::MDec => self.op_mincr(payload, -1, sink),
            OpCode::MLock => self.op_mlock(payload, sink),
            OpCode::MUnlock => self.op_munlock(payload, sink),
            OpCode::Count => self.op_count(payload, sink),
            OpCode::Stats => self.op_stats(sink),
            OpCode::Ping => self.op_ping(sink),
            OpCode::Meta => self.op_meta(payload, sink),
            OpCode::Keys => self.op_keys(payload, sink),
            OpCode::End => self.op_end(sink),
        }
        Ok(())
    }

    // ---- shared item plumbing ----

    /// Builds the stored payload for `value`, compressing when the value
    /// crosses the threshold and compression saves enough.
    pub(crate) fn encode_value(&mut self, value: &[u8]) -> ItemData {
        if value.len() > self.config.compression {
            if let Some(len) = codec::compress_bounded(value, &mut self.scratch) {
                let rate = 100 - (100 * len / value.len());
                self.stats.compravg = EngineStats::fold_avg(self.stats.compravg, rate as u64);
                return ItemData::Compressed(self.scratch[..len].to_vec());
            }
        }
        ItemData::Plain(value.to_vec())
    }

    /// Creates an item anchored at the engine clock, updating population
    /// counters for a key of `key_len` bytes.
    pub(crate) fn create_item(&mut self, key_len: usize, data: ItemData) -> Item {
        let now = self.stats.time;
        let item = Item::new(data, now);
        self.pool.acquire();
        self.stats.nitems += 1;
        if item.data.encoding() == ValueEncoding::Compressed {
            self.stats.ncompressed += 1;
        }
        if self.stats.firstin == 0 {
            self.stats.firstin = now;
        }
        self.stats.lastin = now;
        self.stats.sizeavg = EngineStats::fold_avg(self.stats.sizeavg, item.data.size() as u64);
        self.stats.charge(item.mem_cost(key_len));
        item
    }

    /// Destroys an item previously stored under a key of `key_len` bytes,
    /// decrementing counters symmetrically.
    pub(crate) fn destroy_item(&mut self, key_len: usize, item: Item) {
        self.stats.discharge(item.mem_cost(key_len));
        if item.data.encoding() == ValueEncoding::Compressed {
            self.stats.ncompressed = self.stats.ncompressed.saturating_sub(1);
        }
        self.stats.nitems = self.stats.nitems.saturating_sub(1);
        self.pool.release();
    }

    /// Lazy expiry: detaches and destroys `key` when its ttl has run out.
    /// Returns true when an expired item was reaped.
    pub(crate) fn reap_if_expired(&mut self, key: &[u8]) -> bool {
        let expired = match self.index.get(key) {
            Some(item) => item.is_expired(self.stats.time),
            None => false,
        };
        if expired {
            if let Some(item) = self.index.remove(key) {
                self.destroy_item(key.len(), item);
            }
        }
        expired
    }

    /// Clamps a parsed ttl against the configured ceiling; non-positive
    /// input disables expiry.
    pub(crate) fn effective_ttl(&self, parsed: i64) -> i64 {
        if parsed > 0 {
            parsed.min(self.config.max_item_ttl)
        } else {
            -1
        }
    }

    pub(crate) fn op_ping(&mut self, sink: &mut dyn ReplySink) {
        sink.enqueue_code(ReplyCode::Ok);
    }

    pub(crate) fn op_end(&mut self, sink: &mut dyn ReplySink) {
        sink.enqueue_code(ReplyCode::Ok);
        sink.close_after_flush();
    }
}
