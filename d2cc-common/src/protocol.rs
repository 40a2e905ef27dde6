//! d2cc session wire protocol.
//!
//! Every message is a frame: a 4-byte ASCII tag, a big-endian `u32` holding the
//! total frame length (header included), then the body.
//!
//! | Kind           | Tag    | Body                                   |
//! |----------------|--------|----------------------------------------|
//! | Hello          | `D2CC` | version `u16` BE, flags `u16` BE       |
//! | ArgV           | `ARGV` | NUL-terminated strings, concatenated   |
//! | Data           | `DATA` | raw bytes, at most [`MAX_DATA_CHUNK`]  |
//! | CompileRequest | `CREQ` | empty                                  |
//! | Discard        | `DSCR` | empty                                  |
//!
//! Arguments travel as raw OS bytes and are never re-encoded.

use crate::errors::ProtocolError;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Tag plus length.
pub const HEADER_LEN: usize = 8;

/// Largest Data body. Matches the C library's `BUFSIZ` on glibc.
pub const MAX_DATA_CHUNK: usize = 8 * 1024;

/// Largest frame a decoder will accept, checked before allocating.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub const PROTOCOL_VERSION: u16 = 0;
pub const PROTOCOL_FLAGS: u16 = 0;

/// Stands in for the input file in a remoted argv.
pub const ARGV_INPUT_PLACEHOLDER: &str = "@d2cc_input@";
/// Stands in for the output file in a remoted argv.
pub const ARGV_OUTPUT_PLACEHOLDER: &str = "@d2cc_output@";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    ArgV,
    Data,
    CompileRequest,
    Discard,
}

impl MessageKind {
    pub const fn tag(self) -> [u8; 4] {
        match self {
            Self::Hello => *b"D2CC",
            Self::ArgV => *b"ARGV",
            Self::Data => *b"DATA",
            Self::CompileRequest => *b"CREQ",
            Self::Discard => *b"DSCR",
        }
    }

    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        match &tag {
            b"D2CC" => Some(Self::Hello),
            b"ARGV" => Some(Self::ArgV),
            b"DATA" => Some(Self::Data),
            b"CREQ" => Some(Self::CompileRequest),
            b"DSCR" => Some(Self::Discard),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::ArgV => "argv",
            Self::Data => "data",
            Self::CompileRequest => "compile_request",
            Self::Discard => "discard",
        }
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello { version: u16, flags: u16 },
    ArgV(Vec<OsString>),
    Data(Vec<u8>),
    CompileRequest,
    Discard,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello { .. } => MessageKind::Hello,
            Self::ArgV(_) => MessageKind::ArgV,
            Self::Data(_) => MessageKind::Data,
            Self::CompileRequest => MessageKind::CompileRequest,
            Self::Discard => MessageKind::Discard,
        }
    }

    /// Encode into a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Hello { version, flags } => Ok(encode_hello(*version, *flags)),
            Self::ArgV(args) => encode_argv(args),
            Self::Data(chunk) => encode_data(chunk),
            Self::CompileRequest => Ok(encode_compile_request()),
            Self::Discard => Ok(encode_discard()),
        }
    }
}

fn frame(kind: MessageKind, body: &[u8]) -> Vec<u8> {
    let total = HEADER_LEN + body.len();
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&kind.tag());
    // Callers bound the body well below u32::MAX.
    buf.extend_from_slice(&(total as u32).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

pub fn encode_hello(version: u16, flags: u16) -> Vec<u8> {
    let mut body = [0u8; 4];
    body[..2].copy_from_slice(&version.to_be_bytes());
    body[2..].copy_from_slice(&flags.to_be_bytes());
    frame(MessageKind::Hello, &body)
}

/// Encode an argument list, pulling each argument from `args` exactly once.
///
/// An argument containing NUL cannot be represented and is rejected.
pub fn encode_argv<I, S>(args: I) -> Result<Vec<u8>, ProtocolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&MessageKind::ArgV.tag());
    buf.extend_from_slice(&[0u8; 4]);
    for arg in args {
        let bytes = arg.as_ref().as_bytes();
        if bytes.contains(&0) {
            return Err(ProtocolError::Malformed(format!(
                "argument {:?} contains NUL",
                arg.as_ref()
            )));
        }
        buf.extend_from_slice(bytes);
        buf.push(0);
        if buf.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::Malformed(format!(
                "argv exceeds {MAX_FRAME_LEN} bytes"
            )));
        }
    }
    let total = buf.len() as u32;
    buf[4..HEADER_LEN].copy_from_slice(&total.to_be_bytes());
    Ok(buf)
}

pub fn encode_data(chunk: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if chunk.len() > MAX_DATA_CHUNK {
        return Err(ProtocolError::Malformed(format!(
            "data chunk of {} bytes exceeds {MAX_DATA_CHUNK}",
            chunk.len()
        )));
    }
    Ok(frame(MessageKind::Data, chunk))
}

pub fn encode_compile_request() -> Vec<u8> {
    frame(MessageKind::CompileRequest, &[])
}

pub fn encode_discard() -> Vec<u8> {
    frame(MessageKind::Discard, &[])
}

/// Validate a frame header, returning the kind and total frame length.
fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(MessageKind, usize), ProtocolError> {
    let tag = [header[0], header[1], header[2], header[3]];
    let kind = MessageKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len < HEADER_LEN {
        return Err(ProtocolError::Malformed(format!(
            "length {len} is shorter than the header"
        )));
    }
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::Malformed(format!(
            "length {len} exceeds {MAX_FRAME_LEN}"
        )));
    }
    Ok((kind, len))
}

fn parse_body(kind: MessageKind, body: &[u8]) -> Result<Message, ProtocolError> {
    match kind {
        MessageKind::Hello => {
            if body.len() != 4 {
                return Err(ProtocolError::Malformed(format!(
                    "hello body is {} bytes, expected 4",
                    body.len()
                )));
            }
            Ok(Message::Hello {
                version: u16::from_be_bytes([body[0], body[1]]),
                flags: u16::from_be_bytes([body[2], body[3]]),
            })
        }
        MessageKind::ArgV => {
            let Some((&last, strings)) = body.split_last() else {
                return Ok(Message::ArgV(Vec::new()));
            };
            if last != 0 {
                return Err(ProtocolError::Malformed(
                    "argv body is not NUL-terminated".to_string(),
                ));
            }
            let args = strings
                .split(|b| *b == 0)
                .map(|s| OsString::from_vec(s.to_vec()))
                .collect();
            Ok(Message::ArgV(args))
        }
        MessageKind::Data => {
            if body.len() > MAX_DATA_CHUNK {
                return Err(ProtocolError::Malformed(format!(
                    "data body of {} bytes exceeds {MAX_DATA_CHUNK}",
                    body.len()
                )));
            }
            Ok(Message::Data(body.to_vec()))
        }
        MessageKind::CompileRequest | MessageKind::Discard => {
            if !body.is_empty() {
                return Err(ProtocolError::Malformed(format!(
                    "{} body must be empty, got {} bytes",
                    kind.name(),
                    body.len()
                )));
            }
            Ok(if kind == MessageKind::CompileRequest {
                Message::CompileRequest
            } else {
                Message::Discard
            })
        }
    }
}

/// Decode the first frame in `buf`.
///
/// Returns the message and the number of bytes it occupied. Never reads past
/// the end of `buf`: a short buffer is [`ProtocolError::Truncated`].
pub fn decode(buf: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let Some(header) = buf.first_chunk::<HEADER_LEN>() else {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    };
    let (kind, len) = parse_header(header)?;
    if buf.len() < len {
        return Err(ProtocolError::Truncated {
            needed: len,
            available: buf.len(),
        });
    }
    let message = parse_body(kind, &buf[HEADER_LEN..len])?;
    Ok((message, len))
}

/// Failure reading a frame from a byte stream.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Fill `buf` until it is full or the stream ends; returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly one frame from `reader`.
///
/// `Ok(None)` means the stream ended cleanly between frames.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Message>, ReadError> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(reader, &mut header).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: got,
        }
        .into());
    }
    let (kind, len) = parse_header(&header)?;
    let mut body = vec![0u8; len - HEADER_LEN];
    let got = read_full(reader, &mut body).await?;
    if got < body.len() {
        return Err(ProtocolError::Truncated {
            needed: len,
            available: HEADER_LEN + got,
        }
        .into());
    }
    Ok(Some(parse_body(kind, &body)?))
}
