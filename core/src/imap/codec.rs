/*
 * codec.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postino, an IMAP client library.
 *
 * Postino is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postino is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postino.  If not, see <http://www.gnu.org/licenses/>.
 */

//! CRLF line framing with IMAP literals.
//!
//! A server response is one line, or a line ending in `{n}` followed by `n`
//! raw octets and the rest of the response. [`LineCodec::read_response`]
//! stitches those pieces back into one buffer (literal octets in place,
//! final CRLF removed) for the parser.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use super::error::ImapError;
use crate::config::DEFAULT_MAX_LITERAL_SIZE;

const READ_CHUNK: usize = 8192;

pub struct LineCodec<S> {
    stream: S,
    buffer: BytesMut,
    read_timeout: Option<Duration>,
    max_literal_size: usize,
}

impl<S> LineCodec<S> {
    pub fn new(stream: S) -> Self {
        LineCodec {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            read_timeout: None,
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
        }
    }

    /// A read that waits longer than this fails with `ConnectionLost`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Upper bound for a literal or an unterminated line.
    pub fn with_max_literal_size(mut self, max: usize) -> Self {
        self.max_literal_size = max;
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn max_literal_size(&self) -> usize {
        self.max_literal_size
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Release the stream. Fails if the server already sent bytes we have not consumed,
    /// which would otherwise be lost (or injected) across a TLS upgrade.
    pub fn into_inner(self) -> Result<S, ImapError> {
        if !self.buffer.is_empty() {
            return Err(ImapError::protocol("unexpected data buffered before stream upgrade", &self.buffer));
        }
        Ok(self.stream)
    }
}

impl<S> LineCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Next line, without its line terminator.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, ImapError> {
        let mut scanned = 0;
        loop {
            if let Some(offset) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + offset;
                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                trace!(line = %String::from_utf8_lossy(&line), "S:");
                return Ok(line.to_vec());
            }
            scanned = self.buffer.len();
            if scanned > self.max_literal_size {
                return Err(ImapError::Transport(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "response line exceeds size limit",
                )));
            }
            self.fill().await?;
        }
    }

    /// Exactly `size` octets.
    pub async fn read_literal(&mut self, size: usize) -> Result<Vec<u8>, ImapError> {
        if size > self.max_literal_size {
            return Err(ImapError::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("literal of {} octets exceeds limit of {}", size, self.max_literal_size),
            )));
        }
        while self.buffer.len() < size {
            self.fill().await?;
        }
        trace!(size, "S: literal");
        Ok(self.buffer.split_to(size).to_vec())
    }

    /// One complete response with its literals inlined.
    pub async fn read_response(&mut self) -> Result<Vec<u8>, ImapError> {
        let mut response = Vec::new();
        loop {
            let line = self.read_line().await?;
            let literal = literal_size(&line)?;
            response.extend_from_slice(&line);
            match literal {
                Some(size) => {
                    response.extend_from_slice(b"\r\n");
                    let data = self.read_literal(size).await?;
                    response.extend_from_slice(&data);
                }
                None => return Ok(response),
            }
        }
    }

    /// `tag SP text CRLF` in a single write.
    pub async fn write_command(&mut self, tag: &str, text: &[u8]) -> Result<(), ImapError> {
        let mut line = Vec::with_capacity(tag.len() + text.len() + 3);
        line.extend_from_slice(tag.as_bytes());
        line.push(b' ');
        line.extend_from_slice(text);
        line.extend_from_slice(b"\r\n");
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// `data CRLF`, flushed. Used for continuation data and the tail of a command.
    pub async fn write_line(&mut self, data: &[u8]) -> Result<(), ImapError> {
        let mut line = Vec::with_capacity(data.len() + 2);
        line.extend_from_slice(data);
        line.extend_from_slice(b"\r\n");
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Literal octets; not flushed until the following [`write_line`](Self::write_line).
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), ImapError> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ImapError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn fill(&mut self) -> Result<(), ImapError> {
        self.buffer.reserve(READ_CHUNK);
        let read = self.stream.read_buf(&mut self.buffer);
        let n = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(?limit, "read timed out");
                    return Err(ImapError::ConnectionLost);
                }
            },
            None => read.await?,
        };
        if n == 0 {
            return Err(ImapError::ConnectionLost);
        }
        Ok(())
    }
}

/// Size announced by a trailing `{n}` or `{n+}`. A brace group that is not
/// digits is ordinary text; `{}` or an unrepresentable size is an error.
pub(crate) fn literal_size(line: &[u8]) -> Result<Option<usize>, ImapError> {
    let Some(body) = line.strip_suffix(b"}") else {
        return Ok(None);
    };
    let Some(open) = body.iter().rposition(|&b| b == b'{') else {
        return Ok(None);
    };
    let digits = &body[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if !digits.iter().all(u8::is_ascii_digit) {
        return Ok(None);
    }
    let size = digits
        .iter()
        .try_fold(0usize, |acc, &d| acc.checked_mul(10)?.checked_add(usize::from(d - b'0')));
    match size {
        Some(size) if !digits.is_empty() => Ok(Some(size)),
        _ => Err(ImapError::Transport(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed literal length in {:?}", String::from_utf8_lossy(line)),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_literal_size() {
        assert_eq!(literal_size(b"* 3 FETCH (BODY[1] {21}").unwrap(), Some(21));
        assert_eq!(literal_size(b"A1 LOGIN {5+}").unwrap(), Some(5));
        assert_eq!(literal_size(b"* OK done").unwrap(), None);
        assert_eq!(literal_size(b"* OK see {notes}").unwrap(), None);
        assert!(literal_size(b"* 1 FETCH (BODY[] {})").unwrap().is_none());
        assert!(literal_size(b"* 1 FETCH (BODY[] {}").is_err());
        assert!(literal_size(b"* 1 FETCH (BODY[] {99999999999999999999999}").is_err());
    }

    #[tokio::test]
    async fn test_read_response_inlines_literal() {
        let (client, mut server) = duplex(1024);
        let mut codec = LineCodec::new(client);
        server
            .write_all(b"* 3 FETCH (BODY[1] {21}\r\nTesting One Two Three)\r\n* OK next\r\n")
            .await
            .unwrap();
        let response = codec.read_response().await.unwrap();
        assert_eq!(response, b"* 3 FETCH (BODY[1] {21}\r\nTesting One Two Three)".to_vec());
        assert_eq!(codec.read_line().await.unwrap(), b"* OK next".to_vec());
    }

    #[tokio::test]
    async fn test_literal_may_contain_crlf() {
        let (client, mut server) = duplex(1024);
        let mut codec = LineCodec::new(client);
        server.write_all(b"* 1 FETCH (RFC822 {7}\r\na\r\nb\r\n )\r\n").await.unwrap();
        let response = codec.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (RFC822 {7}\r\na\r\nb\r\n )".to_vec());
    }

    #[tokio::test]
    async fn test_eof_is_connection_lost() {
        let (client, mut server) = duplex(64);
        let mut codec = LineCodec::new(client);
        server.write_all(b"* OK partial").await.unwrap();
        drop(server);
        assert!(matches!(codec.read_line().await, Err(ImapError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_oversized_literal_rejected() {
        let (client, mut server) = duplex(64);
        let mut codec = LineCodec::new(client).with_max_literal_size(8);
        server.write_all(b"* 1 FETCH (RFC822 {9}\r\n").await.unwrap();
        assert!(matches!(codec.read_response().await, Err(ImapError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (client, _server) = duplex(64);
        let mut codec = LineCodec::new(client).with_read_timeout(Some(Duration::from_secs(60)));
        assert!(matches!(codec.read_line().await, Err(ImapError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_write_command() {
        let (client, mut server) = duplex(64);
        let mut codec = LineCodec::new(client);
        codec.write_command("A0001", b"NOOP").await.unwrap();
        let mut buf = [0u8; 12];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"A0001 NOOP\r\n");
    }
}
