//! Content-Length message framing.
//!
//! Each message on the wire is a block of CRLF-terminated header lines, a
//! blank line, and exactly `Content-Length` payload bytes of UTF-8 JSON.
//! Framing failures are kept distinct from JSON parse failures: the former
//! destroy message-boundary synchronization and are fatal to the stream,
//! while the latter still produce a well-formed error response.

use std::{
    fmt,
    io::{self, BufRead, Write},
};

use serde_json::Value;

/// Failure to delimit one message on the byte stream.
#[derive(Debug)]
pub enum FrameError {
    /// Underlying I/O failure.
    Io(io::Error),
    /// Header block ended without a Content-Length header.
    MissingContentLength,
    /// Content-Length header present but not a decimal byte count.
    InvalidContentLength(String),
    /// Stream ended inside a header block or before the announced payload
    /// length was read.
    UnexpectedEof { expected: usize, context: &'static str },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "i/o error: {err}"),
            Self::MissingContentLength => write!(f, "missing Content-Length header"),
            Self::InvalidContentLength(raw) => write!(f, "invalid Content-Length value '{raw}'"),
            Self::UnexpectedEof { expected, context } => {
                write!(f, "stream ended inside {context} (expected {expected} more bytes)")
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Reads one framed message body.
///
/// Returns `Ok(None)` when the stream closes cleanly at a frame boundary.
/// Header names match case-insensitively and unknown headers are skipped, so
/// a client may send `Content-Type` or anything else between the length
/// header and the blank line.
///
/// # Errors
///
/// Returns `FrameError` when the header block has no usable length header,
/// when the stream ends mid-frame, or on I/O failure.
pub fn read_frame(reader: &mut impl BufRead) -> Result<Option<Vec<u8>>, FrameError> {
    let mut content_length: Option<usize> = None;
    let mut saw_header_bytes = false;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            if saw_header_bytes {
                return Err(FrameError::UnexpectedEof {
                    expected: 0,
                    context: "header block",
                });
            }
            return Ok(None);
        }
        saw_header_bytes = true;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(value.trim().to_owned()))?;
                content_length = Some(parsed);
            }
        }
    }

    let Some(content_length) = content_length else {
        return Err(FrameError::MissingContentLength);
    };

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::UnexpectedEof {
                expected: content_length,
                context: "payload",
            }
        } else {
            FrameError::Io(err)
        }
    })?;
    Ok(Some(body))
}

/// Writes one framed JSON message and flushes it.
///
/// The length header counts payload bytes, not characters.
///
/// # Errors
///
/// Returns the underlying I/O error; serialization of a `serde_json::Value`
/// cannot fail.
pub fn write_frame(writer: &mut impl Write, payload: &Value) -> io::Result<()> {
    let body = serde_json::to_vec(payload).map_err(io::Error::other)?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}
