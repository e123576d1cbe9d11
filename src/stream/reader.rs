use std::io::{self, BufRead};

#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    /// Line content without its `\n` or `\r\n` terminator.
    Text(&'a [u8]),
    /// Longer than the configured maximum. The content was skipped, not
    /// buffered.
    TooLong,
}

/// Reads newline-delimited records while holding at most `max_line_bytes`
/// of any one line in memory.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        LineReader {
            inner,
            buf: Vec::with_capacity(1024),
            max_line_bytes,
        }
    }

    pub fn next_line(&mut self) -> io::Result<Option<Line<'_>>> {
        self.buf.clear();
        let mut seen_any = false;
        let mut too_long = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            seen_any = true;

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = match newline {
                Some(end) => &available[..end],
                None => available,
            };
            if !too_long {
                if self.buf.len() + chunk.len() > self.max_line_bytes {
                    too_long = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(chunk);
                }
            }

            let used = newline.map_or(available.len(), |end| end + 1);
            self.inner.consume(used);
            if newline.is_some() {
                break;
            }
        }

        if !seen_any {
            return Ok(None);
        }
        if too_long {
            return Ok(Some(Line::TooLong));
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(Line::Text(&self.buf)))
    }
}
