use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StompError;
use crate::frame::{Command, Frame};

/// Default upper bound for a single frame (headers + body).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Bytes sent on the wire for a heart-beat.
pub const HEARTBEAT: &[u8] = b"\n";

/// Item produced by [`StompCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    Frame(Frame),
    /// A bare EOL between frames.
    Heartbeat,
}

#[derive(Debug, Clone, Copy)]
pub struct StompCodec {
    max_frame_len: usize,
}

impl Default for StompCodec {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl StompCodec {
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    fn check_len(&self, len: usize) -> Result<(), StompError> {
        if len > self.max_frame_len {
            return Err(StompError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        Ok(())
    }
}

/// Locate the blank line ending the header block.
/// Returns (end of header text, start of body).
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut pos = 0;
    while let Some(offset) = memchr::memchr(b'\n', &buf[pos..]) {
        let nl = pos + offset;
        let next = nl + 1;
        if buf.get(next) == Some(&b'\n') {
            return Some((nl, next + 1));
        }
        if buf.get(next) == Some(&b'\r') && buf.get(next + 1) == Some(&b'\n') {
            return Some((nl, next + 2));
        }
        pos = next;
    }
    None
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(StompError::InvalidEscape(other)),
            None => return Err(StompError::InvalidEscape(' ')),
        }
    }
    Ok(out)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn parse_head(head: &[u8]) -> Result<(Command, Vec<(String, String)>), StompError> {
    let text = std::str::from_utf8(head)?;
    let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let command = Command::try_from(lines.next().unwrap_or_default())?;
    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }
    Ok((command, headers))
}

impl StompCodec {
    /// Drop the frame at the front of `src` after a decode error, up to and
    /// including its NUL. Clears `src` when no NUL is buffered.
    ///
    /// Frames buffered behind the bad one stay decodable.
    pub fn skip_frame(src: &mut BytesMut) -> usize {
        let skipped = match memchr::memchr(0, src) {
            Some(nul) => nul + 1,
            None => src.len(),
        };
        src.advance(skipped);
        skipped
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = StompError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] == b'\n' {
            src.advance(1);
            return Ok(Some(StompItem::Heartbeat));
        }
        if src.starts_with(b"\r\n") {
            src.advance(2);
            return Ok(Some(StompItem::Heartbeat));
        }

        let Some((head_end, body_start)) = find_header_end(src) else {
            self.check_len(src.len())?;
            return Ok(None);
        };
        let (command, headers) = parse_head(&src[..head_end])?;

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StompError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let end = body_start
                    .checked_add(len)
                    .filter(|end| *end < usize::MAX)
                    .ok_or(StompError::FrameTooLarge {
                        len,
                        max: self.max_frame_len,
                    })?;
                self.check_len(end + 1)?;
                if src.len() <= end {
                    return Ok(None);
                }
                if src[end] != 0 {
                    return Err(StompError::MissingNul);
                }
                end
            }
            None => match memchr::memchr(0, &src[body_start..]) {
                Some(offset) => body_start + offset,
                None => {
                    self.check_len(src.len())?;
                    return Ok(None);
                }
            },
        };
        self.check_len(body_end + 1)?;

        let mut frame_bytes = src.split_to(body_end + 1);
        frame_bytes.advance(body_start);
        frame_bytes.truncate(body_end - body_start);
        let body: Bytes = frame_bytes.freeze();

        // Trailing EOLs after the NUL belong to this frame.
        while src.first().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            src.advance(1);
        }

        Ok(Some(StompItem::Frame(Frame {
            command,
            headers,
            body,
        })))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = StompError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let escapes = frame.command.escapes_headers();
        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        let mut has_length = false;
        for (name, value) in &frame.headers {
            has_length |= name == "content-length";
            if escapes {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !has_length && !frame.body.is_empty() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        self.check_len(dst.len())
    }
}
