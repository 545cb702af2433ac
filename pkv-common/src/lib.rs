// pkv-common - shared protocol definitions for PrefixKV
//
// This crate defines the opcode/reply enums, the reply body codec, and the
// value compression facade shared by the engine, the server, and the client.

pub mod codec;
pub mod protocol;
pub mod wire;

// Re-export for convenience
pub use protocol::{OpCode, ReplyCode, ValueEncoding};
