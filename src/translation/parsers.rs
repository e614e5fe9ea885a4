//! Skippers for the SQL regions placeholders never appear in. Each takes the index of the
//! region's first byte and returns the index just past its end, or the input length when the
//! region is unterminated.

pub(super) fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut idx = start + 1;
    while idx < bytes.len() {
        if bytes[idx] == quote {
            if bytes.get(idx + 1) == Some(&quote) {
                idx += 2;
                continue;
            }
            return idx + 1;
        }
        idx += 1;
    }
    bytes.len()
}

pub(super) fn is_line_comment(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |n| start + n + 1)
}

pub(super) fn is_block_comment(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

/// Block comments nest, as in PostgreSQL.
pub(super) fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0u32;
    let mut idx = start;
    while idx < bytes.len() {
        if is_block_comment(bytes, idx) {
            depth += 1;
            idx += 2;
        } else if bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/') {
            depth -= 1;
            idx += 2;
            if depth == 0 {
                return idx;
            }
        } else {
            idx += 1;
        }
    }
    bytes.len()
}

/// Length of the dollar-quote opening tag (`$$`, `$body$`) at `start`, if there is one.
/// Tags cannot start with a digit, so `$1` is not a tag.
pub(super) fn dollar_tag_len(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while let Some(&b) = bytes.get(idx) {
        if b == b'$' {
            return Some(idx + 1 - start);
        }
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    None
}

pub(super) fn skip_dollar_quoted(bytes: &[u8], start: usize, tag_len: usize) -> usize {
    let tag = &bytes[start..start + tag_len];
    let body = start + tag_len;
    bytes[body..]
        .windows(tag_len)
        .position(|w| w == tag)
        .map_or(bytes.len(), |n| body + n + tag_len)
}

pub(super) fn digits_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |n| start + n)
}
