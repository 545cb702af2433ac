//! Reply sink seam between the engine and the host I/O layer.
//!
//! The engine enqueues logical replies; framing and flushing belong to the
//! host. Key/value set entries carry `Cow` on both sides so a single entry
//! type covers the stats path (static keys, owned rows) and the index paths
//! (owned position keys or borrowed item data) without ownership ambiguity.

use std::borrow::Cow;

use pkv_common::{ReplyCode, ValueEncoding};

use crate::item::{Item, ItemData};

/// One pair of a key/value set reply.
#[derive(Debug, Clone)]
pub struct KvEntry<'a> {
    pub key: Cow<'a, [u8]>,
    pub encoding: ValueEncoding,
    pub data: Cow<'a, [u8]>,
}

/// Host-implemented reply queue.
///
/// Each engine dispatch enqueues exactly one logical reply; `close_after_flush`
/// additionally asks the host to shut the connection down once queued replies
/// are written (set only by END).
pub trait ReplySink {
    fn enqueue_code(&mut self, code: ReplyCode);
    fn enqueue_data(&mut self, encoding: ValueEncoding, data: &[u8]);
    fn enqueue_kv_set(&mut self, entries: &[KvEntry<'_>]);
    fn close_after_flush(&mut self);
}

/// Enqueues a stored item as a value reply in its wire form.
pub fn enqueue_item(sink: &mut dyn ReplySink, item: &Item) {
    match &item.data {
        ItemData::Plain(data) => sink.enqueue_data(ValueEncoding::Plain, data),
        ItemData::Compressed(data) => sink.enqueue_data(ValueEncoding::Compressed, data),
        ItemData::Number(value) => {
            sink.enqueue_data(ValueEncoding::Number, &value.to_le_bytes())
        }
    }
}

/// Enqueues an integer as a number value reply.
pub fn enqueue_number(sink: &mut dyn ReplySink, value: i64) {
    sink.enqueue_data(ValueEncoding::Number, &value.to_le_bytes());
}
