/// Newline splitter for chunked byte streams.
///
/// Bytes are held until a `\n` arrives, so a record split across two network
/// chunks (or a multi-byte character split across them) is only yielded once
/// it is complete. A trailing `\r` is stripped from every line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Only the new bytes are scanned, and consumed lines are drained once.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        for (i, &b) in self.buf.iter().enumerate().skip(scan_from) {
            if b == b'\n' {
                out.push(trim_cr(&self.buf[start..i]).to_vec());
                start = i + 1;
            }
        }
        if start > 0 {
            self.buf.drain(..start);
        }

        out
    }

    /// Take whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        let rest = trim_cr(&rest);
        (!rest.is_empty()).then(|| rest.to_vec())
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
