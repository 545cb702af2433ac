//! Single-key handlers.
//!
//! One handler per opcode: validate, apply, enqueue exactly one reply. The
//! payload handed in here excludes the two-byte opcode prefix, and `now` is
//! the engine clock observed once at entry.

use std::borrow::Cow;

use pkv_common::{ReplyCode, ValueEncoding};

use crate::engine::Engine;
use crate::item::{Item, ItemData};
use crate::parse;
use crate::reply::{self, KvEntry, ReplySink};

/// Stamp baked in by the release pipeline; plain builds report a fixed
/// placeholder so output stays deterministic.
const BUILD_DATETIME: &str = match option_env!("PKV_BUILD_DATETIME") {
    Some(stamp) => stamp,
    None => "unknown",
};

impl Engine {
    /// SET `<ttl> <key> <value>`
    pub(crate) fn op_set(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        if self.stats.memused > self.config.max_memory {
            sink.enqueue_code(ReplyCode::OutOfMemory);
            return;
        }
        let Some((ttl_span, key, value)) =
            parse::ttl_key_value(payload, self.config.max_key_size, self.config.max_value_size)
        else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        let Some(ttl) = parse::long(ttl_span) else {
            sink.enqueue_code(ReplyCode::Nan);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        if self.index.get(key).is_some_and(|item| item.is_locked(now)) {
            sink.enqueue_code(ReplyCode::Locked);
            return;
        }
        let data = self.encode_value(value);
        let mut item = self.create_item(key.len(), data);
        if ttl > 0 {
            item.ttl = self.effective_ttl(ttl);
            item.time = now;
        }
        if let Some(old) = self.index.insert(key.to_vec(), item) {
            self.destroy_item(key.len(), old);
        }
        match self.index.get(key) {
            Some(item) => reply::enqueue_item(sink, item),
            None => sink.enqueue_code(ReplyCode::Err),
        }
    }

    /// TTL `<key> <ttl>`
    pub(crate) fn op_ttl(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some((key, Some(ttl_span))) = parse::key_value(
            payload,
            self.config.max_key_size,
            self.config.max_value_size,
            true,
        ) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        let Some(ttl) = parse::long(ttl_span) else {
            sink.enqueue_code(ReplyCode::Nan);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        let effective = self.effective_ttl(ttl);
        match self.index.get_mut(key) {
            Some(item) => {
                item.ttl = effective;
                item.time = now;
                item.last_access = now;
                sink.enqueue_code(ReplyCode::Ok);
            }
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// GET `<key>`
    pub(crate) fn op_get(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(key) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        match self.index.get_mut(key) {
            Some(item) => {
                item.last_access = now;
                reply::enqueue_item(sink, item);
            }
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// DEL `<key>`
    pub(crate) fn op_del(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(key) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        if self.reap_if_expired(key) {
            sink.enqueue_code(ReplyCode::NotFound);
            return;
        }
        let now = self.stats.time;
        match self.index.get(key) {
            None => sink.enqueue_code(ReplyCode::NotFound),
            Some(item) if item.is_locked(now) => sink.enqueue_code(ReplyCode::Locked),
            Some(_) => {
                if let Some(item) = self.index.remove(key) {
                    self.destroy_item(key.len(), item);
                }
                sink.enqueue_code(ReplyCode::Ok);
            }
        }
    }

    /// INC/DEC `<key>`, `delta` = +1 / -1.
    ///
    /// A missing key seeds a number item with the literal value 1; a plain
    /// item holding a decimal integer is re-encoded in place.
    pub(crate) fn op_incr(&mut self, payload: &[u8], delta: i64, sink: &mut dyn ReplySink) {
        let Some(key) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        if self.reap_if_expired(key) {
            sink.enqueue_code(ReplyCode::NotFound);
            return;
        }
        let now = self.stats.time;
        if self.index.get(key).is_none() {
            let item = self.create_item(key.len(), ItemData::Number(1));
            self.index.insert(key.to_vec(), item);
            match self.index.get(key) {
                Some(item) => reply::enqueue_item(sink, item),
                None => sink.enqueue_code(ReplyCode::Err),
            }
            return;
        }
        if self.index.get(key).is_some_and(|item| item.is_locked(now)) {
            sink.enqueue_code(ReplyCode::Locked);
            return;
        }
        let mut freed = 0usize;
        let mut result = None;
        if let Some(item) = self.index.get_mut(key) {
            match &mut item.data {
                ItemData::Number(current) => {
                    *current = current.saturating_add(delta);
                    item.last_access = now;
                    result = Some(*current);
                }
                ItemData::Plain(buf) => {
                    if let Some(parsed) = parse::long(buf) {
                        freed = buf.len();
                        let next = parsed.saturating_add(delta);
                        item.data = ItemData::Number(next);
                        item.time = now;
                        item.last_access = now;
                        result = Some(next);
                    }
                }
                ItemData::Compressed(_) => {}
            }
        }
        match result {
            Some(value) => {
                if freed > 0 {
                    self.stats.discharge(freed as u64);
                }
                reply::enqueue_number(sink, value);
            }
            None => sink.enqueue_code(ReplyCode::Nan),
        }
    }

    /// LOCK `<key> <secs>`
    pub(crate) fn op_lock(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some((key, Some(secs_span))) = parse::key_value(
            payload,
            self.config.max_key_size,
            self.config.max_value_size,
            true,
        ) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        let Some(secs) = parse::long(secs_span) else {
            sink.enqueue_code(ReplyCode::Nan);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        match self.index.get_mut(key) {
            None => sink.enqueue_code(ReplyCode::NotFound),
            Some(item) => {
                if item.is_locked(now) {
                    sink.enqueue_code(ReplyCode::Locked);
                } else {
                    item.lock = secs;
                    item.time = now;
                    sink.enqueue_code(ReplyCode::Ok);
                }
            }
        }
    }

    /// UNLOCK `<key>`: forces the unlocked state, whatever the lock was.
    pub(crate) fn op_unlock(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(key) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        match self.index.get_mut(key) {
            Some(item) => {
                item.lock = 0;
                item.last_access = now;
                sink.enqueue_code(ReplyCode::Ok);
            }
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// META `<key> <field>`
    pub(crate) fn op_meta(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some((key, Some(field))) = parse::key_value(
            payload,
            self.config.max_key_size,
            self.config.max_value_size,
            true,
        ) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        self.reap_if_expired(key);
        let now = self.stats.time;
        match self.index.get(key) {
            None => sink.enqueue_code(ReplyCode::NotFound),
            Some(item) => match meta_field(item, field, now) {
                Some(value) => reply::enqueue_number(sink, value),
                None => sink.enqueue_code(ReplyCode::Err),
            },
        }
    }

    /// KEYS `<expr>`
    pub(crate) fn op_keys(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(expr) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        let keys = self
            .index
            .matching_keys(expr, None, self.config.max_key_size);
        if keys.is_empty() {
            sink.enqueue_code(ReplyCode::NotFound);
            return;
        }
        let entries: Vec<KvEntry<'_>> = keys
            .into_iter()
            .enumerate()
            .map(|(position, key)| KvEntry {
                key: Cow::Owned(position.to_string().into_bytes()),
                encoding: ValueEncoding::Plain,
                data: Cow::Owned(key),
            })
            .collect();
        sink.enqueue_kv_set(&entries);
    }

    /// COUNT `<expr>`: always replies with the tally, zero included.
    pub(crate) fn op_count(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(expr) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        let keys = self
            .index
            .matching_keys(expr, None, self.config.max_key_size);
        let mut tally: i64 = 0;
        for key in keys {
            if self.reap_if_expired(&key) {
                continue;
            }
            let now = self.stats.time;
            if let Some(item) = self.index.get_mut(&key) {
                item.last_access = now;
                tally += 1;
            }
        }
        reply::enqueue_number(sink, tally);
    }

    /// STATS: fixed key/value set of engine counters.
    pub(crate) fn op_stats(&mut self, sink: &mut dyn ReplySink) {
        let stats = &self.stats;
        let usable = self.config.max_memory.saturating_sub(stats.memused);
        let fragmentation = if stats.memused > 0 {
            stats.mempeak as f64 / stats.memused as f64
        } else {
            0.0
        };
        let per_client = if stats.connections > 0 {
            stats.requests as f64 / stats.connections as f64
        } else {
            0.0
        };
        let rows: [(&'static [u8], Vec<u8>); 27] = [
            (b"server_version", own(env!("CARGO_PKG_VERSION"))),
            (b"server_build_datetime", own(BUILD_DATETIME)),
            (b"server_allocator", own("system")),
            (b"server_arch", num(usize::BITS as u64)),
            (b"server_started", num(stats.started)),
            (b"server_time", num(stats.time)),
            (b"first_item_seen", num(stats.firstin)),
            (b"last_item_seen", num(stats.lastin)),
            (b"total_items", num(stats.nitems)),
            (b"total_compressed_items", num(stats.ncompressed)),
            (b"total_clients", num(stats.nclients)),
            (b"total_cron_done", num(stats.crondone)),
            (b"total_connections", num(stats.connections)),
            (b"total_requests", num(stats.requests)),
            (b"item_pool_current_used", num(self.pool.used())),
            (b"item_pool_current_capacity", num(self.pool.capacity())),
            (b"item_pool_total_capacity", num(self.pool.total_capacity())),
            (b"item_pool_object_size", num(self.pool.object_size())),
            (b"item_pool_max_block_size", num(self.pool.max_block_size())),
            (b"memory_available", num(self.config.max_memory)),
            (b"memory_usable", num(usable)),
            (b"memory_used", num(stats.memused)),
            (b"memory_peak", num(stats.mempeak)),
            (b"memory_fragmentation", own(&format!("{fragmentation:.2}"))),
            (b"item_size_avg", num(stats.sizeavg)),
            (b"compr_rate_avg", num(stats.compravg)),
            (b"reqs_per_client_avg", own(&format!("{per_client:.2}"))),
        ];
        let entries: Vec<KvEntry<'_>> = rows
            .iter()
            .map(|(key, value)| KvEntry {
                key: Cow::Borrowed(*key),
                encoding: ValueEncoding::Plain,
                data: Cow::Borrowed(value.as_slice()),
            })
            .collect();
        sink.enqueue_kv_set(&entries);
    }
}

fn own(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

fn num(value: u64) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Resolves a META field by prefix match, in declaration order.
fn meta_field(item: &Item, field: &[u8], now: u64) -> Option<i64> {
    let left = if item.ttl <= 0 {
        -1
    } else {
        item.ttl - now.saturating_sub(item.time) as i64
    };
    let fields: [(&[u8], i64); 7] = [
        (b"size", item.data.size() as i64),
        (b"encoding", item.data.encoding().as_u8() as i64),
        (b"access", item.last_access as i64),
        (b"created", item.time as i64),
        (b"ttl", item.ttl),
        (b"left", left),
        (b"lock", item.lock),
    ];
    if field.is_empty() {
        return None;
    }
    fields
        .iter()
        .find(|(name, _)| name.starts_with(field))
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::reply::test_sink::{Recorded, RecordingSink};
    use pkv_common::codec;

    fn engine_at(now: u64) -> Engine {
        Engine::new(EngineConfig::default(), now)
    }

    fn set(engine: &mut Engine, payload: &[u8]) -> Recorded {
        let mut sink = RecordingSink::new();
        engine.op_set(payload, &mut sink);
        sink.take()
    }

    fn get(engine: &mut Engine, key: &[u8]) -> Recorded {
        let mut sink = RecordingSink::new();
        engine.op_get(key, &mut sink);
        sink.take()
    }

    fn plain(bytes: &[u8]) -> Recorded {
        Recorded::Data(ValueEncoding::Plain, bytes.to_vec())
    }

    fn number(value: i64) -> Recorded {
        Recorded::Data(ValueEncoding::Number, value.to_le_bytes().to_vec())
    }

    #[test]
    fn set_get_del_roundtrip() {
        let mut engine = engine_at(100);
        assert_eq!(set(&mut engine, b"-1 hello world"), plain(b"world"));
        assert_eq!(get(&mut engine, b"hello"), plain(b"world"));

        let mut sink = RecordingSink::new();
        engine.op_del(b"hello", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(get(&mut engine, b"hello"), Recorded::Code(ReplyCode::NotFound));
        assert_eq!(engine.stats().nitems, 0);
        assert_eq!(engine.item_count(), 0);
    }

    #[test]
    fn set_replaces_and_keeps_population_consistent() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k first");
        set(&mut engine, b"-1 k second");
        assert_eq!(engine.stats().nitems, 1);
        assert_eq!(engine.item_count(), 1);
        assert_eq!(get(&mut engine, b"k"), plain(b"second"));
    }

    #[test]
    fn set_is_gated_by_the_memory_budget() {
        let mut engine = Engine::new(
            EngineConfig {
                max_memory: 1,
                ..EngineConfig::default()
            },
            100,
        );
        // first write passes (memused is still zero), second trips the gate
        assert_eq!(set(&mut engine, b"-1 a v"), plain(b"v"));
        assert_eq!(
            set(&mut engine, b"-1 b v"),
            Recorded::Code(ReplyCode::OutOfMemory)
        );
    }

    #[test]
    fn set_with_bad_ttl_is_nan() {
        let mut engine = engine_at(100);
        assert_eq!(
            set(&mut engine, b"x k v"),
            Recorded::Code(ReplyCode::Nan)
        );
    }

    #[test]
    fn set_truncates_key_and_value_at_the_limits() {
        let mut engine = Engine::new(
            EngineConfig {
                max_key_size: 4,
                max_value_size: 3,
                ..EngineConfig::default()
            },
            100,
        );
        set(&mut engine, b"-1 abcdefgh value");
        // the effective key is the four-byte truncation; the byte at the
        // boundary is consumed as the separator and the value clamps to three
        assert_eq!(get(&mut engine, b"abcd"), plain(b"fgh"));
    }

    #[test]
    fn set_compresses_past_the_threshold() {
        let mut engine = Engine::new(
            EngineConfig {
                compression: 16,
                ..EngineConfig::default()
            },
            100,
        );
        let value = b"abcd".repeat(32);
        let mut payload = b"-1 big ".to_vec();
        payload.extend_from_slice(&value);
        let reply = set(&mut engine, &payload);
        let Recorded::Data(encoding, stored) = reply else {
            panic!("expected a value reply");
        };
        assert_eq!(encoding, ValueEncoding::Compressed);
        assert!(stored.len() < value.len());
        assert_eq!(codec::decompress(&stored).expect("decode"), value);
        assert_eq!(engine.stats().ncompressed, 1);
        assert!(engine.stats().compravg > 0);
    }

    #[test]
    fn incompressible_values_stay_plain() {
        let mut engine = Engine::new(
            EngineConfig {
                compression: 16,
                ..EngineConfig::default()
            },
            100,
        );
        let value: Vec<u8> = (0..=255u8).collect();
        let mut payload = b"-1 noise ".to_vec();
        payload.extend_from_slice(&value);
        let Recorded::Data(encoding, stored) = set(&mut engine, &payload) else {
            panic!("expected a value reply");
        };
        assert_eq!(encoding, ValueEncoding::Plain);
        assert_eq!(stored, value);
        assert_eq!(engine.stats().ncompressed, 0);
    }

    #[test]
    fn expiry_is_lazy_and_destroys_on_access() {
        let mut engine = engine_at(100);
        set(&mut engine, b"2 k v");
        engine.tick(101);
        assert_eq!(get(&mut engine, b"k"), plain(b"v"));
        engine.tick(103);
        assert_eq!(get(&mut engine, b"k"), Recorded::Code(ReplyCode::NotFound));
        assert_eq!(engine.item_count(), 0);
        assert_eq!(engine.stats().nitems, 0);
    }

    #[test]
    fn ttl_command_sets_resets_and_disables() {
        let mut engine = engine_at(100);
        let mut sink = RecordingSink::new();
        engine.op_ttl(b"missing 5", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::NotFound));

        set(&mut engine, b"-1 k v");
        engine.op_ttl(b"k 5", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(engine.index.get(b"k").map(|i| i.ttl), Some(5));

        // zero is parsed as not-greater-than-zero: expiry stays disabled
        engine.op_ttl(b"k 0", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(engine.index.get(b"k").map(|i| i.ttl), Some(-1));

        engine.op_ttl(b"k abc", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Nan));
    }

    #[test]
    fn ttl_clamps_to_the_configured_ceiling() {
        let mut engine = Engine::new(
            EngineConfig {
                max_item_ttl: 10,
                ..EngineConfig::default()
            },
            100,
        );
        set(&mut engine, b"-1 k v");
        let mut sink = RecordingSink::new();
        engine.op_ttl(b"k 99999", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(engine.index.get(b"k").map(|i| i.ttl), Some(10));
    }

    #[test]
    fn set_ttl_anchors_the_countdown() {
        let mut engine = engine_at(100);
        set(&mut engine, b"7 k v");
        let item = engine.index.get(b"k").expect("stored");
        assert_eq!(item.ttl, 7);
        assert_eq!(item.time, 100);
    }

    #[test]
    fn inc_dec_follow_the_numeric_fast_path() {
        let mut engine = engine_at(100);
        let mut sink = RecordingSink::new();

        engine.op_incr(b"counter", 1, &mut sink);
        assert_eq!(sink.take(), number(1));
        engine.op_incr(b"counter", 1, &mut sink);
        assert_eq!(sink.take(), number(2));
        engine.op_incr(b"counter", -1, &mut sink);
        assert_eq!(sink.take(), number(1));
    }

    #[test]
    fn inc_reencodes_a_numeric_plain_item() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 counter 10");
        engine.tick(105);
        let mut sink = RecordingSink::new();
        engine.op_incr(b"counter", 1, &mut sink);
        assert_eq!(sink.take(), number(11));
        let item = engine.index.get(b"counter").expect("stored");
        assert_eq!(item.data, ItemData::Number(11));
        // the encoding flip re-anchors the countdown
        assert_eq!(item.time, 105);
    }

    #[test]
    fn inc_rejects_non_numeric_payloads() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k notanumber");
        let mut sink = RecordingSink::new();
        engine.op_incr(b"k", 1, &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Nan));
    }

    #[test]
    fn dec_on_a_missing_key_seeds_one() {
        let mut engine = engine_at(100);
        let mut sink = RecordingSink::new();
        engine.op_incr(b"fresh", -1, &mut sink);
        assert_eq!(sink.take(), number(1));
    }

    #[test]
    fn lock_blocks_mutation_until_release() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k x");
        let mut sink = RecordingSink::new();

        engine.op_lock(b"k 5", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(
            set(&mut engine, b"-1 k y"),
            Recorded::Code(ReplyCode::Locked)
        );
        engine.op_del(b"k", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Locked));
        engine.op_lock(b"k 9", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Locked));

        engine.op_unlock(b"k", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        assert_eq!(set(&mut engine, b"-1 k y"), plain(b"y"));
    }

    #[test]
    fn lock_expires_with_the_clock() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k x");
        let mut sink = RecordingSink::new();
        engine.op_lock(b"k 5", &mut sink);
        sink.take();
        engine.tick(105);
        assert_eq!(set(&mut engine, b"-1 k y"), plain(b"y"));
    }

    #[test]
    fn permanent_lock_survives_any_clock_advance() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k x");
        let mut sink = RecordingSink::new();
        engine.op_lock(b"k -1", &mut sink);
        sink.take();
        engine.tick(u64::MAX);
        assert_eq!(
            set(&mut engine, b"-1 k y"),
            Recorded::Code(ReplyCode::Locked)
        );
    }

    #[test]
    fn unlock_is_a_noop_on_an_unlocked_item() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k x");
        let mut sink = RecordingSink::new();
        engine.op_unlock(b"k", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Ok));
        engine.op_unlock(b"missing", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::NotFound));
    }

    #[test]
    fn lock_with_bad_seconds_is_nan() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k x");
        let mut sink = RecordingSink::new();
        engine.op_lock(b"k soon", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Nan));
    }

    #[test]
    fn meta_reports_fields_by_prefix() {
        let mut engine = engine_at(100);
        set(&mut engine, b"5 k value");
        engine.tick(102);
        let mut sink = RecordingSink::new();

        engine.op_meta(b"k size", &mut sink);
        assert_eq!(sink.take(), number(5));
        engine.op_meta(b"k enc", &mut sink);
        assert_eq!(sink.take(), number(0));
        engine.op_meta(b"k created", &mut sink);
        assert_eq!(sink.take(), number(100));
        engine.op_meta(b"k ttl", &mut sink);
        assert_eq!(sink.take(), number(5));
        engine.op_meta(b"k left", &mut sink);
        assert_eq!(sink.take(), number(3));
        engine.op_meta(b"k lock", &mut sink);
        assert_eq!(sink.take(), number(0));
        engine.op_meta(b"k bogus", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::Err));
        engine.op_meta(b"missing size", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::NotFound));
    }

    #[test]
    fn meta_left_is_minus_one_without_expiry() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k v");
        let mut sink = RecordingSink::new();
        engine.op_meta(b"k left", &mut sink);
        assert_eq!(sink.take(), number(-1));
    }

    #[test]
    fn keys_enumerates_matches_by_position() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 user:1 a");
        set(&mut engine, b"-1 user:2 b");
        set(&mut engine, b"-1 other c");
        let mut sink = RecordingSink::new();
        engine.op_keys(b"user:", &mut sink);
        let Recorded::KvSet(pairs) = sink.take() else {
            panic!("expected a kv set");
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (b"0".to_vec(), ValueEncoding::Plain, b"user:1".to_vec()));
        assert_eq!(pairs[1], (b"1".to_vec(), ValueEncoding::Plain, b"user:2".to_vec()));

        engine.op_keys(b"nomatch", &mut sink);
        assert_eq!(sink.take(), Recorded::Code(ReplyCode::NotFound));
    }

    #[test]
    fn count_tallies_live_matches_and_reaps_expired() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 tmp:1 a");
        set(&mut engine, b"2 tmp:2 b");
        set(&mut engine, b"-1 other c");
        engine.tick(103);
        let mut sink = RecordingSink::new();
        engine.op_count(b"tmp:", &mut sink);
        assert_eq!(sink.take(), number(1));
        // the expired entry was destroyed in passing
        assert!(engine.index.get(b"tmp:2").is_none());

        engine.op_count(b"none", &mut sink);
        assert_eq!(sink.take(), number(0));
    }

    #[test]
    fn count_touches_last_access() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 tmp:1 a");
        engine.tick(140);
        let mut sink = RecordingSink::new();
        engine.op_count(b"tmp:", &mut sink);
        sink.take();
        assert_eq!(engine.index.get(b"tmp:1").map(|i| i.last_access), Some(140));
    }

    #[test]
    fn stats_emits_the_fixed_row_set() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k v");
        let mut sink = RecordingSink::new();
        engine.op_stats(&mut sink);
        let Recorded::KvSet(rows) = sink.take() else {
            panic!("expected a kv set");
        };
        assert_eq!(rows.len(), 27);
        assert_eq!(rows[0].0, b"server_version".to_vec());
        assert_eq!(rows[5].0, b"server_time".to_vec());
        assert_eq!(rows[5].2, b"100".to_vec());
        assert_eq!(rows[8].0, b"total_items".to_vec());
        assert_eq!(rows[8].2, b"1".to_vec());
        assert_eq!(rows[26].0, b"reqs_per_client_avg".to_vec());
        // every value is plain ASCII
        assert!(rows.iter().all(|(_, enc, _)| *enc == ValueEncoding::Plain));
    }

    #[test]
    fn get_touches_last_access() {
        let mut engine = engine_at(100);
        set(&mut engine, b"-1 k v");
        engine.tick(120);
        get(&mut engine, b"k");
        assert_eq!(engine.index.get(b"k").map(|i| i.last_access), Some(120));
    }
}
