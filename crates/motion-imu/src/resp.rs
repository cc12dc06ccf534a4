//! Minimal RESP2 client for popping samples off the live queue.
//!
//! Only what the queue consumer needs: encoding commands as arrays of bulk
//! strings and a streaming reply parser that tolerates fragmented reads.

use crate::source::SourceError;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const CRLF: &[u8] = b"\r\n";

/// Cap on pre-allocation for array replies, independent of the advertised length.
const MAX_PREALLOC: usize = 1024;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Vec<u8>>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<Reply>>),
}

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Unknown reply type byte 0x{0:02x}")]
    UnknownType(u8),
    #[error("Malformed length or integer field")]
    BadNumber,
    #[error("Bulk payload not terminated by CRLF")]
    MissingTerminator,
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(CRLF);
    }
    out
}

/// Streaming reply parser.
///
/// Feed raw bytes via `push_data`, then drain parsed replies via `next_reply`.
#[derive(Debug)]
pub struct RespParser {
    buffer: VecDeque<u8>,
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(4096),
        }
    }

    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Drop any partially received reply.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to extract the next complete reply from the buffer.
    /// Returns `None` if no complete reply is available yet.
    pub fn next_reply(&mut self) -> Option<Result<Reply, ProtocolError>> {
        let parsed = parse_reply(self.buffer.make_contiguous());
        match parsed {
            Ok(None) => None,
            Ok(Some((reply, used))) => {
                self.buffer.drain(..used);
                Some(Ok(reply))
            }
            Err(e) => {
                // The stream cannot be resynchronised after garbage.
                self.buffer.clear();
                Some(Err(e))
            }
        }
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one reply from the front of `buf`, returning it with the bytes consumed.
fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
    let Some(&kind) = buf.first() else {
        return Ok(None);
    };
    let Some(line_len) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let line = &buf[1..1 + line_len];
    let mut consumed = 1 + line_len + CRLF.len();

    let reply = match kind {
        b'+' => Reply::Simple(String::from_utf8_lossy(line).into_owned()),
        b'-' => Reply::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => Reply::Integer(parse_int(line)?),
        b'_' => Reply::Bulk(None),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Reply::Bulk(None), consumed)));
            }
            let len = len as usize;
            let end = consumed + len;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(ProtocolError::MissingTerminator);
            }
            let data = buf[consumed..end].to_vec();
            consumed = end + CRLF.len();
            Reply::Bulk(Some(data))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some((Reply::Array(None), consumed)));
            }
            let count = count as usize;
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                match parse_reply(&buf[consumed..])? {
                    Some((item, used)) => {
                        items.push(item);
                        consumed += used;
                    }
                    None => return Ok(None),
                }
            }
            Reply::Array(Some(items))
        }
        other => return Err(ProtocolError::UnknownType(other)),
    };

    Ok(Some((reply, consumed)))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|window| window == CRLF)
}

fn parse_int(line: &[u8]) -> Result<i64, ProtocolError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ProtocolError::BadNumber)
}

/// Connection to the queue server.
///
/// A failed round-trip drops the socket; the next call dials again. Nothing is
/// retried within a single call.
#[derive(Debug)]
pub struct RespConnection {
    addr: String,
    io_timeout: Duration,
    stream: Option<TcpStream>,
    parser: RespParser,
}

impl RespConnection {
    /// Dial the server. Fails if it is unreachable within `io_timeout`.
    pub async fn connect(addr: &str, io_timeout: Duration) -> Result<Self, SourceError> {
        let mut conn = Self {
            addr: addr.to_string(),
            io_timeout,
            stream: None,
            parser: RespParser::new(),
        };
        conn.ensure_connected().await?;
        Ok(conn)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream, SourceError> {
        if self.stream.is_none() {
            tracing::info!(addr = %self.addr, "Connecting to sample queue");
            let stream = tokio::time::timeout(self.io_timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| SourceError::Timeout)?
                .map_err(|e| SourceError::Unavailable {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                })?;
            stream.set_nodelay(true)?;
            self.parser.clear();
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(SourceError::Closed)
    }

    /// Send one command and wait for its reply.
    pub async fn command(&mut self, args: &[&str]) -> Result<Reply, SourceError> {
        let io_timeout = self.io_timeout;
        let result = tokio::time::timeout(io_timeout, self.round_trip(args)).await;
        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                self.stream = None;
                Err(e)
            }
            Err(_) => {
                self.stream = None;
                Err(SourceError::Timeout)
            }
        }
    }

    async fn round_trip(&mut self, args: &[&str]) -> Result<Reply, SourceError> {
        let request = encode_command(args);
        self.ensure_connected().await?.write_all(&request).await?;

        let mut buf = [0u8; 4096];
        loop {
            if let Some(reply) = self.parser.next_reply() {
                return Ok(reply?);
            }
            let n = self.ensure_connected().await?.read(&mut buf).await?;
            if n == 0 {
                return Err(SourceError::Closed);
            }
            self.parser.push_data(&buf[..n]);
        }
    }

    /// Pop the oldest entry of `key` (RPOP on a list the producer LPUSHes).
    pub async fn rpop(&mut self, key: &str) -> Result<Option<String>, SourceError> {
        match self.command(&["RPOP", key]).await? {
            Reply::Bulk(Some(data)) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Reply::Bulk(None) | Reply::Array(None) => Ok(None),
            Reply::Error(message) => Err(SourceError::Server(message)),
            other => Err(SourceError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}
