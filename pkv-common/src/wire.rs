//! # Reply and Request Body Codec
//!
//! Purpose: Encode request bodies and encode/parse reply bodies without
//! copying more than once, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **Caller-Owned Buffers**: Encoders append to a caller-provided `Vec`.
//! 2. **Top-Down Parsing**: Replies are decoded with minimal state.
//! 3. **Binary-Safe**: Keys and values are raw bytes throughout.
//! 4. **Fail Fast**: Truncated or unknown framing surfaces immediately.
//!
//! ## Reply Body Shapes
//!
//! ```text
//! Code reply:
//! +---------+
//! | code:2B |
//! +---------+
//!
//! Value reply (code = VAL):
//! +---------+--------+--------+------------+
//! | code:2B | enc:1B | len:4B | data bytes |
//! +---------+--------+--------+------------+
//!
//! Key/value set reply (code = KVSET), then per pair:
//! +---------+----------+   +---------+-----+--------+--------+-------+
//! | code:2B | count:4B |   | klen:4B | key | enc:1B | vlen:4B| value |
//! +---------+----------+   +---------+-----+--------+--------+-------+
//! ```
//!
//! All integers are little-endian.

use thiserror::Error;

use crate::protocol::{OpCode, ReplyCode, ValueEncoding};

/// Reply body decode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The body ended before the announced structure was complete.
    #[error("reply body truncated")]
    Truncated,
    /// The leading code was outside the closed reply-code set.
    #[error("unknown reply code {0}")]
    UnknownReplyCode(u16),
    /// A value encoding byte was outside the closed encoding set.
    #[error("unknown value encoding {0}")]
    UnknownEncoding(u8),
    /// A `Number` payload was not exactly eight bytes.
    #[error("number payload of {0} bytes")]
    BadNumber(usize),
}

/// Owned logical reply as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireReply {
    /// One-shot status with an empty body.
    Code(ReplyCode),
    /// Single value with its encoding.
    Value {
        encoding: ValueEncoding,
        data: Vec<u8>,
    },
    /// Aligned key/value pairs.
    KvSet(Vec<(Vec<u8>, ValueEncoding, Vec<u8>)>),
}

/// Appends a request body (`opcode` + raw payload) to `out`.
pub fn encode_request(op: OpCode, payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&op.as_u16().to_le_bytes());
    out.extend_from_slice(payload);
}

/// Appends a code reply body to `out`.
pub fn encode_code(code: ReplyCode, out: &mut Vec<u8>) {
    out.extend_from_slice(&code.as_u16().to_le_bytes());
}

/// Appends a value reply body to `out`.
pub fn encode_value(encoding: ValueEncoding, data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&ReplyCode::Val.as_u16().to_le_bytes());
    out.push(encoding.as_u8());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

/// Appends a key/value set reply body to `out`.
pub fn encode_kv_set(pairs: &[(&[u8], ValueEncoding, &[u8])], out: &mut Vec<u8>) {
    out.extend_from_slice(&ReplyCode::KvSet.as_u16().to_le_bytes());
    out.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
    for (key, encoding, data) in pairs {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
        out.push(encoding.as_u8());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
}

/// Little-endian wire form of a `Number` payload.
pub fn number_bytes(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

/// Decodes a `Number` payload.
pub fn decode_number(data: &[u8]) -> Result<i64, WireError> {
    if data.len() != 8 {
        return Err(WireError::BadNumber(data.len()));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(data);
    Ok(i64::from_le_bytes(raw))
}

/// Parses one reply body.
pub fn decode_reply(body: &[u8]) -> Result<WireReply, WireError> {
    let mut cursor = Cursor { body, at: 0 };
    let raw = cursor.take_u16()?;
    let code = ReplyCode::from_u16(raw).ok_or(WireError::UnknownReplyCode(raw))?;
    match code {
        ReplyCode::Val => {
            let encoding = cursor.take_encoding()?;
            let data = cursor.take_block()?.to_vec();
            Ok(WireReply::Value { encoding, data })
        }
        ReplyCode::KvSet => {
            let count = cursor.take_u32()? as usize;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = cursor.take_block()?.to_vec();
                let encoding = cursor.take_encoding()?;
                let data = cursor.take_block()?.to_vec();
                pairs.push((key, encoding, data));
            }
            Ok(WireReply::KvSet(pairs))
        }
        other => Ok(WireReply::Code(other)),
    }
}

struct Cursor<'a> {
    body: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.at.checked_add(len).ok_or(WireError::Truncated)?;
        if end > self.body.len() {
            return Err(WireError::Truncated);
        }
        let span = &self.body[self.at..end];
        self.at = end;
        Ok(span)
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        let span = self.take(2)?;
        Ok(u16::from_le_bytes([span[0], span[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, WireError> {
        let span = self.take(4)?;
        Ok(u32::from_le_bytes([span[0], span[1], span[2], span[3]]))
    }

    fn take_encoding(&mut self) -> Result<ValueEncoding, WireError> {
        let raw = self.take(1)?[0];
        ValueEncoding::from_u8(raw).ok_or(WireError::UnknownEncoding(raw))
    }

    fn take_block(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}
