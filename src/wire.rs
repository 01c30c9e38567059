use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;

/// Hard cap on any single wire line, terminator excluded. A peer that sends
/// more than this before a newline is violating the protocol.
pub const MAX_LINE_BYTES: usize = 1024;

/// Longest accepted display name, in bytes after trimming.
pub const MAX_NAME_BYTES: usize = 50;

/// Exact, case-sensitive line a client sends to end its session gracefully.
pub const LOGOUT_SENTINEL: &str = "logout";

/// Newline-delimited line reader with a hard length bound.
///
/// Bytes consumed from the transport are kept in `partial` until a full line
/// arrives, which makes [`next_line`] cancellation-safe: dropping the future
/// mid-read (as the session's `select!` loop does whenever a broadcast
/// delivery wins the race) never loses input.
///
/// [`next_line`]: LineReader::next_line
pub struct LineReader<R> {
    inner: R,
    partial: Vec<u8>,
    max: usize,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R, max: usize) -> Self {
        Self {
            inner,
            partial: Vec::new(),
            max,
        }
    }

    /// Reads the next line, stripping the terminator (and a preceding `\r`).
    ///
    /// Returns `Ok(None)` on a clean end-of-stream. A final unterminated
    /// line at end-of-stream is still returned, matching what netcat-style
    /// peers produce when they close without a trailing newline.
    pub async fn next_line(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            let (used, terminated) = {
                let available = self.inner.fill_buf().await.map_err(SessionError::Io)?;
                if available.is_empty() {
                    if self.partial.is_empty() {
                        return Ok(None);
                    }
                    (0, true)
                } else {
                    match available.iter().position(|&byte| byte == b'\n') {
                        Some(pos) => {
                            self.partial.extend_from_slice(&available[..pos]);
                            (pos + 1, true)
                        }
                        None => {
                            self.partial.extend_from_slice(available);
                            (available.len(), false)
                        }
                    }
                }
            };
            self.inner.consume(used);

            // Bail before buffering an unbounded amount from a hostile peer.
            if self.partial.len() > self.max {
                self.partial.clear();
                return Err(SessionError::LineTooLong { limit: self.max });
            }
            if terminated {
                break;
            }
        }

        let mut line = std::mem::take(&mut self.partial);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let line = String::from_utf8(line).map_err(|_| SessionError::InvalidUtf8)?;
        Ok(Some(line))
    }
}

/// Writes `text` followed by a newline and flushes so peers see it promptly.
pub async fn send_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Validates a registration line, returning the trimmed display name.
pub fn validate_name(line: &str) -> Result<String, &'static str> {
    let name = line.trim();
    if name.is_empty() {
        return Err("display name cannot be empty");
    }
    if name.len() > MAX_NAME_BYTES {
        return Err("display name is too long");
    }
    Ok(name.to_string())
}
