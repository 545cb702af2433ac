//! # PrefixKV Query Engine
//!
//! The in-memory core: request dispatch, payload parsing, the ordered
//! prefix index with lazy TTL expiry, transparent compression on write, the
//! advisory lock discipline, and the multi-key traversal semantics.
//!
//! ## Usage
//!
//! - Build an [`Engine`] from an [`EngineConfig`] and the current wall-clock
//!   second, then feed it request buffers through [`Engine::dispatch`].
//! - The engine never calls the OS clock; the host refreshes it through
//!   [`Engine::tick`] from a periodic task.
//! - Replies flow through the host's [`ReplySink`] implementation; exactly
//!   one logical reply is enqueued per dispatched request.
//!
//! ## Design Principles
//!
//! 1. **Whole-Handler Atomicity**: Handlers run to completion against the
//!    index and the counters; the host serializes invocations.
//! 2. **Lazy Expiry**: TTLs are evaluated only on access, and any access
//!    observing an expired item also destroys it.
//! 3. **Snapshot Traversal**: Multi-key ops snapshot the match set before
//!    visiting, so a traversal never revisits keys written by its own pass.

mod engine;
mod handlers;
mod index;
mod item;
mod multi;
mod parse;
mod pool;
mod reply;
mod stats;

pub use engine::{Engine, EngineConfig, EngineError};
pub use index::PrefixIndex;
pub use item::{Item, ItemData};
pub use reply::{enqueue_item, enqueue_number, KvEntry, ReplySink};
pub use stats::EngineStats;
