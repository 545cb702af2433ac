//! # Transparent Value Compression
//!
//! Purpose: Wrap the lz4 block codec behind the engine's
//! compress-only-when-it-pays contract.
//!
//! ## Design Principles
//! 1. **Bounded Benefit**: A compressed form is kept only when it saves at
//!    least [`MIN_SAVING`] bytes over the raw value.
//! 2. **Self-Framing**: A 4-byte little-endian raw-length header precedes
//!    the lz4 block, so readers can size the output without any metadata
//!    from the stored item.
//! 3. **Scratch Reuse**: Compression writes into a caller-owned scratch
//!    buffer; the caller copies out only on success.

use thiserror::Error;

/// Minimum bytes of saving required before a compressed form is kept.
pub const MIN_SAVING: usize = 4;

/// Bytes of raw-length framing in front of the lz4 block.
const RAW_LEN_HEADER: usize = 4;

/// Upper bound accepted for a framed raw length; guards corrupt frames.
const MAX_RAW_LEN: usize = 64 * 1024 * 1024;

/// Decompression failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame ended before the raw-length header was complete.
    #[error("compressed frame truncated")]
    Truncated,
    /// The framed raw length exceeds the decode limit.
    #[error("framed raw length {0} exceeds the decode limit")]
    RawLenTooLarge(usize),
    /// The lz4 block itself failed to decode.
    #[error("lz4 block decode failed: {0}")]
    Corrupt(#[from] lz4_flex::block::DecompressError),
    /// The block decoded to a different length than the frame announced.
    #[error("decoded {got} bytes, frame announced {want}")]
    LengthMismatch { got: usize, want: usize },
}

/// Compresses `src` into `scratch`, keeping the result only when it saves at
/// least [`MIN_SAVING`] bytes including the framing header.
///
/// Returns the encoded length within `scratch`, or `None` when compression
/// does not pay (the caller stores the plain form instead). The scratch
/// buffer is grown to the codec's worst case and reused across calls.
pub fn compress_bounded(src: &[u8], scratch: &mut Vec<u8>) -> Option<usize> {
    if src.len() <= RAW_LEN_HEADER + MIN_SAVING {
        return None;
    }
    scratch.clear();
    scratch.resize(
        RAW_LEN_HEADER + lz4_flex::block::get_maximum_output_size(src.len()),
        0,
    );
    let (header, body) = scratch.split_at_mut(RAW_LEN_HEADER);
    header.copy_from_slice(&(src.len() as u32).to_le_bytes());
    let written = lz4_flex::block::compress_into(src, body).ok()?;
    let total = RAW_LEN_HEADER + written;
    if total + MIN_SAVING > src.len() {
        return None;
    }
    Some(total)
}

/// Decodes a frame produced by [`compress_bounded`] back to the raw bytes.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>, CodecError> {
    if src.len() < RAW_LEN_HEADER {
        return Err(CodecError::Truncated);
    }
    let mut header = [0u8; RAW_LEN_HEADER];
    header.copy_from_slice(&src[..RAW_LEN_HEADER]);
    let raw_len = u32::from_le_bytes(header) as usize;
    if raw_len > MAX_RAW_LEN {
        return Err(CodecError::RawLenTooLarge(raw_len));
    }
    let mut out = vec![0u8; raw_len];
    let got = lz4_flex::block::decompress_into(&src[RAW_LEN_HEADER..], &mut out)?;
    if got != raw_len {
        return Err(CodecError::LengthMismatch { got, want: raw_len });
    }
    Ok(out)
}
