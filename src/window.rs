//! Initial window: the last N complete lines of a file at session start.
//!
//! Scans backwards from the end in fixed chunks, so the cost follows the
//! size of the window rather than the size of the file.

use crate::line::{complete_lines, decode_line};
use crate::source::FileSource;
use std::io;

const CHUNK_SIZE: u64 = 8 * 1024;

/// Lines to emit before following, and where following starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialWindow {
    pub lines: Vec<String>,
    /// Byte offset just past the last emitted line (or end of file when no
    /// window was requested).
    pub cursor: u64,
}

/// Read the last `n` complete lines of `source`.
///
/// A trailing line without a terminator is left out and the cursor stops in
/// front of it, so the follower emits it once it is complete. With `n == 0`
/// no content is read and the cursor is the current end of file.
pub fn read_last_lines<F: FileSource>(source: &mut F, n: usize) -> io::Result<InitialWindow> {
    let len = source
        .current_len()?
        .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

    if n == 0 {
        return Ok(InitialWindow {
            lines: Vec::new(),
            cursor: len,
        });
    }

    // Newline offsets from the end: the first marks the end of the window,
    // the (n+1)th the byte before its start.
    let mut newlines: Vec<u64> = Vec::new();
    let mut chunk_end = len;
    let mut buf = vec![0u8; CHUNK_SIZE as usize];
    while chunk_end > 0 && newlines.len() <= n {
        let chunk_start = chunk_end.saturating_sub(CHUNK_SIZE);
        let want = (chunk_end - chunk_start) as usize;
        let got = read_full(source, chunk_start, &mut buf[..want])?;
        for i in (0..got).rev() {
            if buf[i] == b'\n' {
                newlines.push(chunk_start + i as u64);
                if newlines.len() > n {
                    break;
                }
            }
        }
        chunk_end = chunk_start;
    }

    let Some(&last_newline) = newlines.first() else {
        return Ok(InitialWindow {
            lines: Vec::new(),
            cursor: 0,
        });
    };
    let end = last_newline + 1;
    let start = newlines.get(n).map_or(0, |p| p + 1);

    let mut data = vec![0u8; (end - start) as usize];
    let got = read_full(source, start, &mut data)?;
    data.truncate(got);

    let mut cursor = start;
    let mut lines = Vec::new();
    for line in complete_lines(&data) {
        cursor += line.len() as u64;
        lines.push(decode_line(line));
    }

    tracing::debug!(
        path = %source.path().display(),
        requested = n,
        returned = lines.len(),
        cursor,
        "read initial window"
    );
    Ok(InitialWindow { lines, cursor })
}

/// Fill `buf` from `offset`, stopping early only at end of file.
fn read_full<F: FileSource>(source: &mut F, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(offset + filled as u64, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
