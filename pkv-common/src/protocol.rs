//! # Protocol Definitions
//!
//! Purpose: Define the opcode, reply-code, and value-encoding enums shared
//! across the engine, the server, and the client.
//!
//! ## Design Principles
//!
//! 1. **Closed Sets**: Every wire constant is an enum with a fallible
//!    conversion; unknown values never coerce silently.
//! 2. **Fixed Width**: Opcodes and reply codes travel as little-endian u16,
//!    encodings as a single byte.
//! 3. **Minimal Overhead**: Plain fieldless enums keep conversions free.
//!
//! ## Wire Layout
//!
//! ```text
//! Request body:
//! +-----------+------------------+
//! | opcode:2B | payload (bytes)  |
//! +-----------+------------------+
//!
//! Reply body:
//! +---------+------------------------------+
//! | code:2B | shape depends on the code    |
//! +---------+------------------------------+
//! ```
//!
//! The transport adds a u32 little-endian length prefix in front of each
//! body; this crate never sees it.

/// Request opcodes, numbered in protocol order starting at 1.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Get = 1,
    Set = 2,
    Del = 3,
    Ttl = 4,
    Inc = 5,
    Dec = 6,
    Lock = 7,
    Unlock = 8,
    MGet = 9,
    MSet = 10,
    MDel = 11,
    MTtl = 12,
    MInc = 13,
    MDec = 14,
    MLock = 15,
    MUnlock = 16,
    Count = 17,
    Stats = 18,
    Ping = 19,
    Meta = 20,
    Keys = 21,
    End = 22,
}

impl OpCode {
    /// Wire representation of the opcode.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Decodes a wire opcode; `None` for anything outside the closed set.
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(OpCode::Get),
            2 => Some(OpCode::Set),
            3 => Some(OpCode::Del),
            4 => Some(OpCode::Ttl),
            5 => Some(OpCode::Inc),
            6 => Some(OpCode::Dec),
            7 => Some(OpCode::Lock),
            8 => Some(OpCode::Unlock),
            9 => Some(OpCode::MGet),
            10 => Some(OpCode::MSet),
            11 => Some(OpCode::MDel),
            12 => Some(OpCode::MTtl),
            13 => Some(OpCode::MInc),
            14 => Some(OpCode::MDec),
            15 => Some(OpCode::MLock),
            16 => Some(OpCode::MUnlock),
            17 => Some(OpCode::Count),
            18 => Some(OpCode::Stats),
            19 => Some(OpCode::Ping),
            20 => Some(OpCode::Meta),
            21 => Some(OpCode::Keys),
            22 => Some(OpCode::End),
            _ => None,
        }
    }
}

/// Reply status codes.
///
/// `Val` and `KvSet` announce a value body; the rest are one-shot statuses
/// with an empty body.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyCode {
    Err = 0,
    NotFound = 1,
    Nan = 2,
    OutOfMemory = 3,
    Locked = 4,
    Ok = 5,
    Val = 6,
    KvSet = 7,
}

impl ReplyCode {
    /// Wire representation of the reply code.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Decodes a wire reply code.
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(ReplyCode::Err),
            1 => Some(ReplyCode::NotFound),
            2 => Some(ReplyCode::Nan),
            3 => Some(ReplyCode::OutOfMemory),
            4 => Some(ReplyCode::Locked),
            5 => Some(ReplyCode::Ok),
            6 => Some(ReplyCode::Val),
            7 => Some(ReplyCode::KvSet),
            _ => None,
        }
    }
}

/// Stored/transmitted value encodings.
///
/// `Number` payloads are 8-byte little-endian signed integers; `Compressed`
/// payloads carry the codec's own framing (see [`crate::codec`]).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueEncoding {
    Plain = 0,
    Compressed = 1,
    Number = 2,
}

impl ValueEncoding {
    /// Wire representation of the encoding.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire encoding byte.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ValueEncoding::Plain),
            1 => Some(ValueEncoding::Compressed),
            2 => Some(ValueEncoding::Number),
            _ => None,
        }
    }
}
