//! Multi-key handlers.
//!
//! Each mutating opcode has an expression form that visits every key
//! matching the prefix expression. The match set is snapshotted before the
//! first visit, so a pass never revisits entries it wrote itself. Per entry
//! the visit skips locked items (except MUNLOCK), destroys expired items in
//! passing, and otherwise applies the mutation and touches `last_access`.
//!
//! The reply is the mutation count as a number (possibly zero when entries
//! matched but none were mutable); `ERR_NOT_FOUND` is reserved for an
//! expression that matched nothing at all.

use std::borrow::Cow;

use pkv_common::ReplyCode;

use crate::engine::Engine;
use crate::item::{Item, ItemData};
use crate::parse;
use crate::reply::{self, KvEntry, ReplySink};

impl Engine {
    /// Visits every match of `expr`, applying `apply` to the live, visitable
    /// entries. `apply` returns the freed heap bytes on mutation, `None` to
    /// skip. Returns `None` when the expression matched nothing.
    fn mutate_matches<F>(&mut self, expr: &[u8], skip_locked: bool, mut apply: F) -> Option<i64>
    where
        F: FnMut(&mut Item, u64) -> Option<u64>,
    {
        let keys = self
            .index
            .matching_keys(expr, None, self.config.max_key_size);
        if keys.is_empty() {
            return None;
        }
        let mut mutated = 0i64;
        for key in keys {
            if self.reap_if_expired(&key) {
                continue;
            }
            let now = self.stats.time;
            let outcome = match self.index.get_mut(&key) {
                None => None,
                Some(item) if skip_locked && item.is_locked(now) => None,
                Some(item) => {
                    let applied = apply(item, now);
                    if applied.is_some() {
                        item.last_access = now;
                    }
                    applied
                }
            };
            if let Some(freed) = outcome {
                if freed > 0 {
                    self.stats.discharge(freed);
                }
                mutated += 1;
            }
        }
        Some(mutated)
    }

    /// MGET `<expr>`
    pub(crate) fn op_mget(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
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
        let mut survivors = Vec::with_capacity(keys.len());
        for key in keys {
            if !self.reap_if_expired(&key) {
                survivors.push(key);
            }
        }
        let entries: Vec<KvEntry<'_>> = survivors
            .iter()
            .filter_map(|key| {
                self.index.get(key).map(|item| KvEntry {
                    key: Cow::Borrowed(key.as_slice()),
                    encoding: item.data.encoding(),
                    data: match &item.data {
                        ItemData::Plain(data) | ItemData::Compressed(data) => {
                            Cow::Borrowed(data.as_slice())
                        }
                        ItemData::Number(value) => Cow::Owned(value.to_le_bytes().to_vec()),
                    },
                })
            })
            .collect();
        sink.enqueue_kv_set(&entries);
    }

    /// MSET `<expr> <value>`
    pub(crate) fn op_mset(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        if self.stats.memused > self.config.max_memory {
            sink.enqueue_code(ReplyCode::OutOfMemory);
            return;
        }
        let Some((expr, Some(value))) = parse::key_value(
            payload,
            self.config.max_key_size,
            self.config.max_value_size,
            true,
        ) else {
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
        let mut written = 0i64;
        for key in keys {
            if self.reap_if_expired(&key) {
                continue;
            }
            let now = self.stats.time;
            match self.index.get(&key) {
                None => continue,
                Some(item) if item.is_locked(now) => continue,
                Some(_) => {}
            }
            let data = self.encode_value(value);
            let item = self.create_item(key.len(), data);
            if let Some(old) = self.index.insert(key.clone(), item) {
                self.destroy_item(key.len(), old);
            }
            written += 1;
        }
        reply::enqueue_number(sink, written);
    }

    /// MDEL `<expr>`
    pub(crate) fn op_mdel(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
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
        let mut removed = 0i64;
        for key in keys {
            if self.reap_if_expired(&key) {
                continue;
            }
            let now = self.stats.time;
            if self
                .index
                .get(&key)
                .is_some_and(|item| item.is_locked(now))
            {
                continue;
            }
            if let Some(item) = self.index.remove(&key) {
                self.destroy_item(key.len(), item);
                removed += 1;
            }
        }
        reply::enqueue_number(sink, removed);
    }

    /// MTTL `<expr> <ttl>`
    pub(crate) fn op_mttl(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some((expr, Some(ttl_span))) = parse::key_value(
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
        let effective = self.effective_ttl(ttl);
        match self.mutate_matches(expr, true, |item, now| {
            item.ttl = effective;
            item.time = now;
            Some(0)
        }) {
            Some(count) => reply::enqueue_number(sink, count),
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// MINC/MDEC `<expr>`, `delta` = +1 / -1.
    ///
    /// Applies the numeric transition to each match; non-numeric matches are
    /// skipped, never errors. Missing keys are never created.
    pub(crate) fn op_mincr(&mut self, payload: &[u8], delta: i64, sink: &mut dyn ReplySink) {
        let Some(expr) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        match self.mutate_matches(expr, true, |item, now| match &mut item.data {
            ItemData::Number(current) => {
                *current = current.saturating_add(delta);
                Some(0)
            }
            ItemData::Plain(buf) => {
                let parsed = parse::long(buf)?;
                let freed = buf.len() as u64;
                item.data = ItemData::Number(parsed.saturating_add(delta));
                item.time = now;
                Some(freed)
            }
            ItemData::Compressed(_) => None,
        }) {
            Some(count) => reply::enqueue_number(sink, count),
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// MLOCK `<expr> <secs>`
    pub(crate) fn op_mlock(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some((expr, Some(secs_span))) = parse::key_value(
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
        match self.mutate_matches(expr, true, |item, now| {
            item.lock = secs;
            item.time = now;
            Some(0)
        }) {
            Some(count) => reply::enqueue_number(sink, count),
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }

    /// MUNLOCK `<expr>`: the one visit that ignores lock state.
    pub(crate) fn op_munlock(&mut self, payload: &[u8], sink: &mut dyn ReplySink) {
        let Some(expr) = parse::key(payload, self.config.max_key_size) else {
            sink.enqueue_code(ReplyCode::Err);
            return;
        };
        match self.mutate_matches(expr, false, |item, _now| {
            item.lock = 0;
            Some(0)
        }) {
            Some(count) => reply::enqueue_number(sink, count),
            None => sink.enqueue_code(ReplyCode::NotFound),
        }
    }
}
