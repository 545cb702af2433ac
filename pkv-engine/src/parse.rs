//! Request payload parsing.
//!
//! All parsers slice the payload in place; nothing is copied. The only
//! separator is a single space byte, and every span is bounded by the
//! configured limits, so an oversized key or value is truncated at its
//! limit rather than rejected.

/// Index one past the last key byte: the first space or the scan limit,
/// whichever comes first.
fn span_end(buf: &[u8], max: usize) -> usize {
    let scan = buf.len().min(max);
    buf[..scan]
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(scan)
}

/// Parses a bare key (or prefix expression) from the payload.
///
/// Fails only on an empty key.
pub fn key(buf: &[u8], max_key: usize) -> Option<&[u8]> {
    let end = span_end(buf, max_key);
    if end == 0 {
        return None;
    }
    Some(&buf[..end])
}

/// Parses a key followed by an optional value.
///
/// The value starts one byte past where the key scan stopped (the separator
/// position, even when the key was cut by the limit) and is clamped to
/// `max_value`. With `require_value`, a missing or empty value fails.
pub fn key_value(
    buf: &[u8],
    max_key: usize,
    max_value: usize,
    require_value: bool,
) -> Option<(&[u8], Option<&[u8]>)> {
    let kend = span_end(buf, max_key);
    if kend == 0 {
        return None;
    }
    let key = &buf[..kend];
    let value = if kend < buf.len() {
        let rest = &buf[kend + 1..];
        let vlen = rest.len().min(max_value);
        if vlen == 0 {
            None
        } else {
            Some(&rest[..vlen])
        }
    } else {
        None
    };
    if require_value && value.is_none() {
        return None;
    }
    Some((key, value))
}

/// Parses three successive spans: ttl, key, value.
///
/// The first two are bounded by `max_key` for scanning, the value is
/// clamped to `max_value`. Any empty span fails.
pub fn ttl_key_value(
    buf: &[u8],
    max_key: usize,
    max_value: usize,
) -> Option<(&[u8], &[u8], &[u8])> {
    let tend = span_end(buf, max_key);
    if tend == 0 || tend >= buf.len() {
        return None;
    }
    let ttl = &buf[..tend];
    let rest = &buf[tend + 1..];
    let kend = span_end(rest, max_key);
    if kend == 0 || kend >= rest.len() {
        return None;
    }
    let key = &rest[..kend];
    let tail = &rest[kend + 1..];
    let vlen = tail.len().min(max_value);
    if vlen == 0 {
        return None;
    }
    Some((ttl, key, &tail[..vlen]))
}

/// Parses a signed decimal integer from a byte span.
///
/// A span starting with `'0'` must be exactly one byte and yields 0;
/// otherwise an optional leading `'-'` sets the sign and base-10 digits
/// accumulate. Any other byte fails. Accumulation saturates at the i64
/// range.
pub fn long(span: &[u8]) -> Option<i64> {
    match span {
        [] => None,
        [b'0'] => Some(0),
        [b'0', ..] => None,
        _ => {
            let (negative, digits) = match span[0] {
                b'-' => (true, &span[1..]),
                _ => (false, span),
            };
            if digits.is_empty() {
                return None;
            }
            let mut value: i64 = 0;
            for &b in digits {
                if !b.is_ascii_digit() {
                    return None;
                }
                value = value
                    .saturating_mul(10)
                    .saturating_add((b - b'0') as i64);
            }
            Some(if negative { -value } else { value })
        }
    }
}
