/// Turn a terminated line's bytes into emitted text.
///
/// Drops the `\n` terminator and a `\r` right before it; invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Iterate over the complete (`\n`-terminated) lines at the front of `buf`.
///
/// Each item includes its terminator. Bytes after the last `\n` are not
/// yielded; `complete_len` reports how many bytes the yielded lines cover.
pub fn complete_lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    buf[..complete_len(buf)].split_inclusive(|b| *b == b'\n')
}

/// Length of the prefix of `buf` that ends with the last `\n`.
pub fn complete_len(buf: &[u8]) -> usize {
    buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1)
}
