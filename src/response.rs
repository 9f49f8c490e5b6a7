//! HTTP response values delivered back to the caller.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// A completed HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    http_version: String,
}

impl Response {
    pub fn new(
        status: u16,
        status_text: String,
        headers: Vec<(String, String)>,
        body: Bytes,
        http_version: String,
    ) -> Self {
        Self {
            status,
            status_text,
            headers,
            body,
            http_version,
        }
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// All response headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Name→value mapping. Repeated names keep the last value.
    pub fn header_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (name, value) in &self.headers {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a repeated header (Set-Cookie in particular).
    pub fn get_headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_header("Content-Encoding")
    }

    /// Decode the body based on Content-Encoding (gzip, deflate), sniffing
    /// the gzip magic when the header is missing.
    pub fn decoded_body(&self) -> Result<Bytes> {
        match self.content_encoding().map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => decode_gzip(&self.body),
            Some("deflate") => decode_deflate(&self.body),
            _ => {
                if self.body.len() >= 2 && self.body[0] == 0x1f && self.body[1] == 0x8b {
                    return decode_gzip(&self.body);
                }
                Ok(self.body.clone())
            }
        }
    }

    pub fn text(&self) -> Result<String> {
        let decoded = self.decoded_body()?;
        String::from_utf8(decoded.to_vec())
            .map_err(|e| Error::http_protocol(format!("UTF-8 decode error: {e}")))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let text = self.text()?;
        serde_json::from_str(&text).map_err(Error::from)
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::http_protocol(format!("gzip decode: {e}")))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::http_protocol(format!("deflate decode: {e}")))?;
    Ok(Bytes::from(decoded))
}
