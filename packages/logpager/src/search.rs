//! Substring search over the lines of a file.

use tracing::debug;

use crate::backend::FileBackend;
use crate::error::BackendError;

/// Bytes pulled from the backend per read while scanning.
const SCAN_CHUNK_SIZE: usize = 64 * 1024;

/// Return every line of the file containing `needle`, joined with `\n`, in
/// file order.
///
/// The match is a case-sensitive, unanchored substring test. Lines are the
/// pieces between `\n` separators and the piece after the last separator
/// counts as a line too, so an empty `needle` reproduces the file unchanged.
/// The whole file (as sized when the scan starts) is streamed through
/// [`FileBackend::read_at`] in chunks.
pub async fn search_lines(
    backend: &mut dyn FileBackend,
    needle: &str,
) -> Result<String, BackendError> {
    let size = backend.stat().await?;
    let mut matcher = LineMatcher::new(needle);

    let mut offset = 0u64;
    while offset < size {
        let want = SCAN_CHUNK_SIZE.min((size - offset) as usize);
        let chunk = backend.read_at(offset, want).await?;
        if chunk.is_empty() {
            // Truncated underneath us
            break;
        }
        offset += chunk.len() as u64;
        matcher.feed(&chunk);
    }

    let matches = matcher.finish();
    debug!("{} lines contain {:?}", matches.len(), needle);
    Ok(matches.join("\n"))
}

/// Incremental line splitter that keeps only matching lines.
struct LineMatcher<'a> {
    needle: &'a str,
    /// Bytes of the current, not yet terminated line
    pending: Vec<u8>,
    matches: Vec<String>,
}

impl<'a> LineMatcher<'a> {
    fn new(needle: &'a str) -> Self {
        Self {
            needle,
            pending: Vec::new(),
            matches: Vec::new(),
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.pending[start..start + pos]);
            if line.contains(self.needle) {
                self.matches.push(line.into_owned());
            }
            start += pos + 1;
        }
        self.pending.drain(..start);
    }

    fn finish(mut self) -> Vec<String> {
        let last = String::from_utf8_lossy(&self.pending);
        if last.contains(self.needle) {
            self.matches.push(last.into_owned());
        }
        self.matches
    }
}
