//! Incremental RESP parser.
//!
//! Works on whatever bytes the caller has buffered so far. A short buffer
//! is not an error: [`parse_frame`] returns `Ok(None)` and the caller reads
//! more and tries again. Parsing is a single pass that builds frames
//! directly, so nothing is scanned twice.
//!
//! Both RESP2 and RESP3 null encodings are accepted. Witnesses answer an
//! unknown group with the RESP2 null array `*-1`, so it has to parse.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// Maximum nesting depth for arrays and maps.
const MAX_NESTING_DEPTH: usize = 32;

/// Maximum number of elements in an array or map.
const MAX_AGGREGATE_LEN: usize = 65_536;

/// Maximum length of a bulk string. Nothing vigil reads comes close.
const MAX_BULK_LEN: usize = 1024 * 1024;

/// Cap for up-front `Vec` allocation when an aggregate declares its length.
const PREALLOC_CAP: usize = 64;

/// Parses one frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` when a complete frame is present,
/// `Ok(None)` when more data is needed, or an error if the bytes can never
/// form a valid frame.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let mut parser = Parser { buf, pos: 0 };
    match parser.frame(0) {
        Ok(frame) => Ok(Some((frame, parser.pos))),
        Err(Step::Incomplete) => Ok(None),
        Err(Step::Invalid(e)) => Err(e),
    }
}

/// Internal outcome that separates "need more bytes" from real errors.
enum Step {
    Incomplete,
    Invalid(ProtocolError),
}

impl From<ProtocolError> for Step {
    fn from(e: ProtocolError) -> Self {
        Step::Invalid(e)
    }
}

struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn frame(&mut self, depth: usize) -> Result<Frame, Step> {
        let prefix = self.byte()?;
        match prefix {
            b'+' => Ok(Frame::Simple(self.text_line("simple string")?)),
            b'-' => Ok(Frame::Error(self.text_line("error")?)),
            b':' => Ok(Frame::Integer(self.integer_line()?)),
            b'$' => self.bulk(),
            b'*' => {
                let Some(count) = self.aggregate_len(depth)? else {
                    return Ok(Frame::Null);
                };
                let mut items = Vec::with_capacity(count.min(PREALLOC_CAP));
                for _ in 0..count {
                    items.push(self.frame(depth + 1)?);
                }
                Ok(Frame::Array(items))
            }
            b'%' => {
                let Some(count) = self.aggregate_len(depth)? else {
                    return Ok(Frame::Null);
                };
                let mut pairs = Vec::with_capacity(count.min(PREALLOC_CAP));
                for _ in 0..count {
                    let key = self.frame(depth + 1)?;
                    let val = self.frame(depth + 1)?;
                    pairs.push((key, val));
                }
                Ok(Frame::Map(pairs))
            }
            b'_' => {
                self.line()?;
                Ok(Frame::Null)
            }
            other => Err(ProtocolError::InvalidPrefix(other).into()),
        }
    }

    fn bulk(&mut self) -> Result<Frame, Step> {
        let len = self.integer_line()?;
        if len == -1 {
            return Ok(Frame::Null);
        }
        let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidFrameLength(len))?;
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::BulkStringTooLarge(len).into());
        }

        // payload plus trailing \r\n
        if self.buf.len() - self.pos < len + 2 {
            return Err(Step::Incomplete);
        }
        let start = self.pos;
        let end = start + len;
        if &self.buf[end..end + 2] != b"\r\n" {
            return Err(ProtocolError::InvalidFrameLength(len as i64).into());
        }
        self.pos = end + 2;
        Ok(Frame::Bulk(Bytes::copy_from_slice(&self.buf[start..end])))
    }

    /// Reads an aggregate header. `None` means a RESP2 null aggregate.
    fn aggregate_len(&mut self, depth: usize) -> Result<Option<usize>, Step> {
        if depth + 1 > MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH).into());
        }
        let count = self.integer_line()?;
        if count == -1 {
            return Ok(None);
        }
        let count =
            usize::try_from(count).map_err(|_| ProtocolError::InvalidFrameLength(count))?;
        if count > MAX_AGGREGATE_LEN {
            return Err(ProtocolError::TooManyElements(count).into());
        }
        Ok(Some(count))
    }

    fn byte(&mut self) -> Result<u8, Step> {
        let b = *self.buf.get(self.pos).ok_or(Step::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    /// Returns the bytes up to the next `\r\n` and moves past it.
    fn line(&mut self) -> Result<&'a [u8], Step> {
        let start = self.pos;
        let mut from = start;
        while let Some(offset) = memchr::memchr(b'\r', &self.buf[from..]) {
            let cr = from + offset;
            match self.buf.get(cr + 1) {
                Some(b'\n') => {
                    self.pos = cr + 2;
                    return Ok(&self.buf[start..cr]);
                }
                Some(_) => from = cr + 1,
                None => break,
            }
        }
        Err(Step::Incomplete)
    }

    fn text_line(&mut self, kind: &'static str) -> Result<String, Step> {
        let line = self.line()?;
        let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8(kind))?;
        Ok(s.to_owned())
    }

    fn integer_line(&mut self) -> Result<i64, Step> {
        let line = self.line()?;
        Ok(parse_i64(line)?)
    }
}

/// Parses a decimal i64 without going through `str`.
fn parse_i64(digits: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    // accumulate toward the sign so i64::MIN stays representable
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        let d = (b - b'0') as i64;
        n = n
            .checked_mul(10)
            .and_then(|n| if negative { n.checked_sub(d) } else { n.checked_add(d) })
            .ok_or(ProtocolError::InvalidInteger)?;
    }
    Ok(n)
}
