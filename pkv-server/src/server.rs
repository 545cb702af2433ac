//! # TCP Server
//!
//! Accept binary-protocol connections, frame requests, and dispatch them to
//! the engine with whole-request critical sections. A periodic cron task
//! refreshes the engine clock so handlers never touch the OS clock.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use pkv_common::{wire, ReplyCode, ValueEncoding};
use pkv_engine::{Engine, KvEntry, ReplySink};

use crate::config::Config;

/// Shared engine handle; whole handler invocations run under the lock.
pub type SharedEngine = Arc<Mutex<Engine>>;

/// Current wall-clock second.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Reply sink that frames logical replies into an outbound buffer.
struct FrameSink {
    out: Vec<u8>,
    close: bool,
}

impl FrameSink {
    fn new() -> Self {
        FrameSink {
            out: Vec::new(),
            close: false,
        }
    }

    fn push_frame(&mut self, body: Vec<u8>) {
        self.out
            .extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.out.extend_from_slice(&body);
    }
}

impl ReplySink for FrameSink {
    fn enqueue_code(&mut self, code: ReplyCode) {
        let mut body = Vec::new();
        wire::encode_code(code, &mut body);
        self.push_frame(body);
    }

    fn enqueue_data(&mut self, encoding: ValueEncoding, data: &[u8]) {
        let mut body = Vec::new();
        wire::encode_value(encoding, data, &mut body);
        self.push_frame(body);
    }

    fn enqueue_kv_set(&mut self, entries: &[KvEntry<'_>]) {
        let pairs: Vec<(&[u8], ValueEncoding, &[u8])> = entries
            .iter()
            .map(|entry| (entry.key.as_ref(), entry.encoding, entry.data.as_ref()))
            .collect();
        let mut body = Vec::new();
        wire::encode_kv_set(&pairs, &mut body);
        self.push_frame(body);
    }

    fn close_after_flush(&mut self) {
        self.close = true;
    }
}

/// The PrefixKV TCP server.
pub struct Server {
    config: Config,
    engine: SharedEngine,
}

impl Server {
    /// Builds a server and its engine from the configuration.
    pub fn new(config: Config) -> Self {
        let engine = Arc::new(Mutex::new(Engine::new(config.engine(), unix_now())));
        Server { config, engine }
    }

    /// Handle to the shared engine.
    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Binds the configured address and serves forever.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serves an already-bound listener; lets callers bind an ephemeral port
    /// first.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "listening");
        let engine = Arc::clone(&self.engine);
        let period = Duration::from_millis(self.config.cron.period_ms);
        let cron = tokio::spawn(cron_loop(Arc::clone(&engine), period));

        let max_frame = frame_limit(&self.config);
        let max_clients = self.config.network.max_clients;
        let result = loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => break Err(err),
            };
            if engine.lock().stats().nclients >= max_clients {
                warn!(%peer, "client limit reached, refusing connection");
                continue;
            }
            debug!(%peer, "client connected");
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine.lock().client_connected();
                let outcome = handle_connection(stream, &engine, max_frame).await;
                engine.lock().client_disconnected();
                match outcome {
                    Ok(()) => debug!(%peer, "client disconnected"),
                    Err(err) => debug!(%peer, error = %err, "connection closed"),
                }
            });
        };
        cron.abort();
        result
    }
}

/// Refreshes the engine clock once per period.
async fn cron_loop(engine: SharedEngine, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        engine.lock().tick(unix_now());
    }
}

/// Largest request frame worth reading, derived from the configured limits.
fn frame_limit(config: &Config) -> usize {
    // opcode + ttl span + separators + key + value, with slack
    2 + config.limits.max_key_size + config.limits.max_value_size + 64
}

/// Reads frames off one connection and dispatches them in arrival order.
async fn handle_connection(
    mut stream: TcpStream,
    engine: &SharedEngine,
    max_frame: usize,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    loop {
        while let Some(frame) = take_frame(&mut buffer, max_frame)? {
            let mut sink = FrameSink::new();
            let outcome = engine.lock().dispatch(&frame, &mut sink);
            if let Err(err) = outcome {
                warn!(error = %err, "protocol violation, dropping connection");
                return Ok(());
            }
            stream.write_all(&sink.out).await?;
            if sink.close {
                return Ok(());
            }
        }
        let read = stream.read_buf(&mut buffer).await?;
        if read == 0 {
            return Ok(());
        }
    }
}

/// Splits one complete `[u32 LE length][body]` frame off the buffer.
fn take_frame(buffer: &mut BytesMut, max_frame: usize) -> std::io::Result<Option<Vec<u8>>> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len < 2 || len > max_frame {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame length out of bounds",
        ));
    }
    if buffer.len() < 4 + len {
        return Ok(None);
    }
    buffer.advance(4);
    Ok(Some(buffer.split_to(len).to_vec()))
}
