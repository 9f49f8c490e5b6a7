//! Request building: declarative options in, a fully formed request out.
//!
//! Host-supplied option structures are validated eagerly into typed values
//! (`RequestOptions`, `Body`, `Part`) instead of being duck-typed at use
//! time. Multipart bodies are assembled part by part in declaration order;
//! file parts resolve their content through the external [`FileResolver`]
//! collaborator.

use std::io;

use bytes::Bytes;
use http::{Method, Uri};
use serde_json::Value;

use crate::error::{Error, Result};

/// Default media type for raw string bodies, overridable via the reserved
/// `content-type` header key.
pub const DEFAULT_MEDIA_TYPE: &str = "application/json; charset=utf-8";

/// Resolves an opaque content handle (a URI string) to its bytes. External
/// collaborator; this crate never implements content resolution itself.
pub trait FileResolver: Send + Sync {
    fn resolve(&self, source: &str) -> io::Result<Vec<u8>>;
}

/// Resolver for local paths and `file://` URIs.
pub struct FsResolver;

impl FileResolver for FsResolver {
    fn resolve(&self, source: &str) -> io::Result<Vec<u8>> {
        let path = source.strip_prefix("file://").unwrap_or(source);
        std::fs::read(path)
    }
}

/// Request body: raw payload, multipart form, or none.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    None,
    Raw(String),
    Multipart(Vec<Part>),
}

/// One multipart form part, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        key: String,
        value: String,
    },
    File {
        key: String,
        file_name: String,
        mime_type: String,
        source: String,
    },
}

/// Declarative request description supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub method: Option<String>,
    pub body: Body,
    pub tag: Option<String>,
}

impl RequestOptions {
    /// Validate a dynamic host-supplied structure into typed options.
    ///
    /// The accepted shape mirrors the host bridge: `headers` as a string map,
    /// `method` as a string, `body` as either a raw string or a map carrying
    /// `formData._parts` as `[[key, value-or-descriptor], ...]`, and `tag`
    /// as any non-null scalar. Malformed multipart parts fail here, before
    /// any request is sent; a body of an unrecognized shape is treated as
    /// no body.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Ok(Self::default()),
        };

        let mut options = Self::default();

        if let Some(headers) = obj.get("headers") {
            let map = headers
                .as_object()
                .ok_or_else(|| Error::request_build("'headers' must be a string map"))?;
            for (name, value) in map {
                let value = scalar_to_string(value).ok_or_else(|| {
                    Error::request_build(format!("header '{name}' must be a scalar"))
                })?;
                options.headers.push((name.clone(), value));
            }
        }

        if let Some(method) = obj.get("method") {
            options.method = Some(
                method
                    .as_str()
                    .ok_or_else(|| Error::request_build("'method' must be a string"))?
                    .to_string(),
            );
        }

        if let Some(body) = obj.get("body") {
            options.body = parse_body(body)?;
        }

        if let Some(tag) = obj.get("tag") {
            options.tag = tag_key(tag);
        }

        Ok(options)
    }
}

fn parse_body(body: &Value) -> Result<Body> {
    if let Some(raw) = body.as_str() {
        return Ok(Body::Raw(raw.to_string()));
    }
    let parts = match body
        .as_object()
        .and_then(|b| b.get("formData"))
        .and_then(|f| f.as_object())
        .and_then(|f| f.get("_parts"))
    {
        Some(parts) => parts,
        // Neither a string nor multipart-with-formData: no body attached.
        None => return Ok(Body::None),
    };

    let parts = parts
        .as_array()
        .ok_or_else(|| Error::request_build("'formData._parts' must be an array"))?;

    let mut out = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        let pair = part
            .as_array()
            .filter(|p| p.len() == 2)
            .ok_or_else(|| Error::request_build(format!("part {index} must be a [key, value] pair")))?;
        let key = pair[0]
            .as_str()
            .ok_or_else(|| Error::request_build(format!("part {index} key must be a string")))?
            .to_string();

        if key == "file" {
            let descriptor = pair[1]
                .as_object()
                .ok_or_else(|| Error::request_build(format!("file part {index} must carry a descriptor")))?;
            let field = |name: &str| -> Result<String> {
                descriptor
                    .get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::request_build(format!("file part {index} missing '{name}'"))
                    })
            };
            out.push(Part::File {
                key,
                source: field("uri")?,
                mime_type: field("type")?,
                file_name: field("fileName")?,
            });
        } else {
            let value = scalar_to_string(&pair[1]).ok_or_else(|| {
                Error::request_build(format!("part {index} ('{key}') value must be a scalar"))
            })?;
            out.push(Part::Text { key, value });
        }
    }
    Ok(Body::Multipart(out))
}

/// Canonicalize an opaque tag value to a string key. Any non-null value is
/// accepted; equality of the canonical form is value equality.
fn tag_key(tag: &Value) -> Option<String> {
    match tag {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A fully formed request, ready for the transport.
#[derive(Debug)]
pub struct BuiltRequest {
    pub method: Method,
    pub uri: Uri,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Content-Type to emit alongside the body, when a body is present.
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
    pub tag: Option<String>,
}

impl BuiltRequest {
    /// Build a request from options and a target URL.
    ///
    /// The reserved `content-type` header sets the raw-body media type
    /// instead of being passed through verbatim, so it is emitted exactly
    /// once. Method defaults to `GET`. A body-less `POST` is permitted here;
    /// validating method/body combinations is the transport's concern.
    pub fn build(url: &str, options: &RequestOptions, files: &dyn FileResolver) -> Result<Self> {
        let mut headers = Vec::with_capacity(options.headers.len());
        let mut media_type = DEFAULT_MEDIA_TYPE.to_string();
        for (name, value) in &options.headers {
            if name.eq_ignore_ascii_case("content-type") {
                media_type = value.clone();
            } else {
                headers.push((name.clone(), value.clone()));
            }
        }

        let method = match &options.method {
            Some(m) => Method::from_bytes(m.as_bytes())
                .map_err(|_| Error::request_build(format!("invalid method '{m}'")))?,
            None => Method::GET,
        };

        let (body, content_type) = match &options.body {
            Body::None => (None, None),
            Body::Raw(payload) => (Some(Bytes::from(payload.clone())), Some(media_type)),
            Body::Multipart(parts) => {
                let (bytes, boundary) = assemble_multipart(parts, files)?;
                (
                    Some(bytes),
                    Some(format!("multipart/form-data; boundary={boundary}")),
                )
            }
        };

        let uri: Uri = url
            .parse()
            .map_err(|e| Error::request_build(format!("invalid URL '{url}': {e}")))?;
        if uri.scheme_str().is_none() || uri.host().is_none() {
            return Err(Error::request_build(format!(
                "URL '{url}' must carry a scheme and host"
            )));
        }

        Ok(Self {
            method,
            uri,
            url: url.to_string(),
            headers,
            content_type,
            body,
            tag: options.tag.clone(),
        })
    }
}

/// Assemble a multipart/form-data body, preserving part order.
fn assemble_multipart(parts: &[Part], files: &dyn FileResolver) -> Result<(Bytes, String)> {
    let boundary = random_boundary()?;
    let mut body = Vec::with_capacity(1024);

    for part in parts {
        body.extend_from_slice(b"--");
        body.extend_from_slice(boundary.as_bytes());
        body.extend_from_slice(b"\r\n");
        match part {
            Part::Text { key, value } => {
                body.extend_from_slice(b"Content-Disposition: form-data; name=\"");
                body.extend_from_slice(key.as_bytes());
                body.extend_from_slice(b"\"\r\n\r\n");
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                key,
                file_name,
                mime_type,
                source,
            } => {
                let content = files.resolve(source).map_err(|e| {
                    Error::request_build(format!("file source '{source}' unresolvable: {e}"))
                })?;
                body.extend_from_slice(b"Content-Disposition: form-data; name=\"");
                body.extend_from_slice(key.as_bytes());
                body.extend_from_slice(b"\"; filename=\"");
                body.extend_from_slice(file_name.as_bytes());
                body.extend_from_slice(b"\"\r\nContent-Type: ");
                body.extend_from_slice(mime_type.as_bytes());
                body.extend_from_slice(b"\r\n\r\n");
                body.extend_from_slice(&content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--\r\n");

    Ok((Bytes::from(body), boundary))
}

fn random_boundary() -> Result<String> {
    let mut raw = [0u8; 16];
    getrandom::fill(&mut raw)
        .map_err(|e| Error::request_build(format!("boundary RNG failure: {e}")))?;
    Ok(raw.iter().map(|b| format!("{b:02x}")).collect())
}
