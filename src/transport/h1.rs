//! HTTP/1.1 request writing and response parsing.
//!
//! Raw request assembly over the connected stream, httparse for the
//! response head, RFC 9112 body framing (Content-Length, chunked,
//! close-delimited). Read and write timeouts are idle timeouts: each
//! successful IO operation resets them.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Uri};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::response::Response;
use crate::transport::connector::MaybeHttpsStream;

/// Maximum response head size (64KB).
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of response headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// One HTTP/1.1 exchange over an established stream.
pub struct H1Connection {
    stream: MaybeHttpsStream,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl H1Connection {
    pub fn new(
        stream: MaybeHttpsStream,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            stream,
            read_timeout,
            write_timeout,
        }
    }

    /// Send a request and read the full response.
    ///
    /// `headers` is the final header list (cookies and content type already
    /// merged in by the caller).
    pub async fn send_request(
        &mut self,
        method: &Method,
        uri: &Uri,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<Response> {
        let head = build_request_head(method, uri, headers, body)?;
        self.write_timed(&head).await?;
        if let Some(body) = body {
            self.write_timed(body).await?;
        }
        self.flush_timed().await?;
        self.read_response(method).await
    }

    async fn write_timed(&mut self, data: &[u8]) -> Result<()> {
        match self.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.stream.write_all(data))
                .await
                .map_err(|_| Error::WriteTimeout(deadline))?
                .map_err(|e| Error::http_protocol(format!("failed to write request: {e}"))),
            None => self
                .stream
                .write_all(data)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to write request: {e}"))),
        }
    }

    async fn flush_timed(&mut self) -> Result<()> {
        match self.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.stream.flush())
                .await
                .map_err(|_| Error::WriteTimeout(deadline))?
                .map_err(|e| Error::http_protocol(format!("failed to flush: {e}"))),
            None => self
                .stream
                .flush()
                .await
                .map_err(|e| Error::http_protocol(format!("failed to flush: {e}"))),
        }
    }

    /// Read one chunk from the stream, honoring the read idle timeout.
    async fn read_timed(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.read_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.stream.read(buf))
                .await
                .map_err(|_| Error::ReadTimeout(deadline))?
                .map_err(|e| Error::http_protocol(format!("failed to read response: {e}"))),
            None => self
                .stream
                .read(buf)
                .await
                .map_err(|e| Error::http_protocol(format!("failed to read response: {e}"))),
        }
    }

    /// Read and parse a response, skipping 1xx informational responses.
    async fn read_response(&mut self, method: &Method) -> Result<Response> {
        let mut buffer = Vec::with_capacity(8 * 1024);

        loop {
            // Accumulate until the head is complete.
            while find_head_end(&buffer).is_none() {
                if buffer.len() >= MAX_HEAD_SIZE {
                    return Err(Error::http_protocol("response head too large"));
                }
                let mut read_buf = [0u8; 8192];
                let n = self.read_timed(&mut read_buf).await?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "connection closed before response head complete",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (status, status_text, version, headers, head_len) = parse_head(&buffer)?;

            // 1xx responses have no body; keep reading for the final
            // response, which may already be in the buffer.
            if (100..200).contains(&status) {
                buffer.drain(..head_len);
                continue;
            }

            let remainder = buffer.split_off(head_len);
            let body = self.read_body(method, status, &headers, remainder).await?;
            return Ok(Response::new(status, status_text, headers, body, version));
        }
    }

    async fn read_body(
        &mut self,
        method: &Method,
        status: u16,
        headers: &[(String, String)],
        initial: Vec<u8>,
    ) -> Result<Bytes> {
        // Per RFC 9112 Section 6: HEAD responses and 204/304 carry no body.
        if matches!(status, 204 | 304) || *method == Method::HEAD {
            return Ok(Bytes::new());
        }

        let transfer_encoding = header_value(headers, "transfer-encoding");
        let is_chunked = transfer_encoding
            .map(|v| {
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        if is_chunked {
            return self.read_chunked_body(initial).await;
        }

        // Transfer-Encoding overrides Content-Length.
        if transfer_encoding.is_none() {
            if let Some(cl) = header_value(headers, "content-length") {
                let len = parse_content_length(cl)?;
                return self.read_fixed_body(initial, len).await;
            }
        }

        self.read_until_close(initial).await
    }

    async fn read_fixed_body(&mut self, initial: Vec<u8>, content_length: usize) -> Result<Bytes> {
        let mut body = initial;
        body.truncate(content_length);
        while body.len() < content_length {
            let mut chunk = [0u8; 8192];
            let want = (content_length - body.len()).min(chunk.len());
            let n = self.read_timed(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(Error::http_protocol(format!(
                    "connection closed with {} of {} body bytes",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_until_close(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = initial;
        let mut read_buf = [0u8; 8192];
        loop {
            let n = self.read_timed(&mut read_buf).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = [0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&buffer) {
                    break found;
                }
                let n = self.read_timed(&mut read_buf).await?;
                if n == 0 {
                    return Err(Error::http_protocol("connection closed inside chunk size"));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };
            buffer.drain(..line_end);

            if chunk_size == 0 {
                // Trailer section is consumed and discarded.
                loop {
                    if let Some(pos) = find_crlf(&buffer) {
                        if pos == 0 {
                            return Ok(Bytes::from(body));
                        }
                        buffer.drain(..pos + 2);
                        continue;
                    }
                    let n = self.read_timed(&mut read_buf).await?;
                    if n == 0 {
                        return Ok(Bytes::from(body));
                    }
                    buffer.extend_from_slice(&read_buf[..n]);
                }
            }

            let chunk_end = chunk_size + 2; // data + CRLF
            while buffer.len() < chunk_end {
                let n = self.read_timed(&mut read_buf).await?;
                if n == 0 {
                    return Err(Error::http_protocol("connection closed inside chunk data"));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }
            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_end);
        }
    }
}

/// Build the request head: request line, Host, caller headers,
/// Content-Length, terminating CRLF.
fn build_request_head(
    method: &Method,
    uri: &Uri,
    headers: &[(String, String)],
    body: Option<&Bytes>,
) -> Result<Vec<u8>> {
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut head = Vec::with_capacity(1024);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    head.extend_from_slice(path.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");

    head.extend_from_slice(b"Host: ");
    if let Some(host) = uri.host() {
        head.extend_from_slice(host.as_bytes());
        if let Some(port) = uri.port() {
            head.push(b':');
            head.extend_from_slice(port.as_str().as_bytes());
        }
    }
    head.extend_from_slice(b"\r\n");

    let mut has_connection = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("connection") {
            has_connection = true;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    if !has_connection {
        head.extend_from_slice(b"Connection: close\r\n");
    }

    if let Some(body) = body {
        let has_content_length = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
        if !has_content_length {
            head.extend_from_slice(b"Content-Length: ");
            head.extend_from_slice(body.len().to_string().as_bytes());
            head.extend_from_slice(b"\r\n");
        }
    }

    head.extend_from_slice(b"\r\n");
    Ok(head)
}

fn parse_head(buffer: &[u8]) -> Result<(u16, String, String, Vec<(String, String)>, usize)> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    let head_len = match response
        .parse(buffer)
        .map_err(|e| Error::http_protocol(format!("failed to parse response: {e}")))?
    {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => {
            return Err(Error::http_protocol("incomplete response head"));
        }
    };

    let status = response
        .code
        .ok_or_else(|| Error::http_protocol("missing status code"))?;
    let status_text = response.reason.unwrap_or("").to_string();
    let version = format!("HTTP/1.{}", response.version.unwrap_or(1));
    let parsed_headers: Vec<(String, String)> = response
        .headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).trim().to_string(),
            )
        })
        .collect();

    Ok((status, status_text, version, parsed_headers, head_len))
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a chunk size line, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let pos = find_crlf(buffer)?;
    let line = std::str::from_utf8(&buffer[..pos]).ok()?;
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, pos + 2))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Validate a header name per RFC 9110 Section 5.1 (token characters only).
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::http_protocol("empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::http_protocol(format!(
            "invalid character in header name: {name:?}"
        )));
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF (header injection).
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::http_protocol(
            "invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

/// Parse Content-Length per RFC 9112 Section 6.2: non-negative, and if
/// repeated, all values identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(str::trim);
    let first = parts
        .next()
        .unwrap_or("")
        .parse::<usize>()
        .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {value}")))?;
    for part in parts {
        let val = part
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {value}")))?;
        if val != first {
            return Err(Error::http_protocol(format!(
                "conflicting Content-Length values: {value}"
            )));
        }
    }
    Ok(first)
}
