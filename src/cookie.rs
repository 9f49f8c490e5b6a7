//! RFC 6265 cookie handling and the per-host cookie jar.
//!
//! The jar keeps one ordered list of cookies per host. Saving replaces any
//! cookie with the same (name, path) within that host's list, so the jar
//! holds at most one cookie per (host, name, path) triple. Stored cookies
//! are forwarded to an external persistence sink; sink failures never fail
//! the operation that produced them.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use url::Url;

use crate::error::{Error, Result};

/// RFC 6265 cookie representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_host(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
        }
    }

    /// Parse a Set-Cookie header value, defaulting the domain to the
    /// request URL's host.
    pub fn from_set_cookie_header(header: &str, request_url: &str) -> Result<Self> {
        let parsed_url = Url::parse(request_url).map_err(|e| Error::CookieParse(e.to_string()))?;
        let request_host = parsed_url
            .host_str()
            .ok_or_else(|| Error::CookieParse("no host in URL".to_string()))?;

        let mut parts = header.split(';').map(str::trim);
        let pair = parts
            .next()
            .ok_or_else(|| Error::CookieParse("empty cookie header".to_string()))?;

        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
            None => return Err(Error::CookieParse("no = in cookie".to_string())),
        };
        if name.is_empty() {
            return Err(Error::CookieParse("empty cookie name".to_string()));
        }

        let mut cookie = Cookie::new(name, value, request_host);
        for attr in parts {
            if attr.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if attr.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" => cookie.domain = normalize_host(val.trim()),
                    "path" => cookie.path = val.trim().to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val.trim()),
                    "max-age" => cookie.max_age = val.trim().parse().ok(),
                    "samesite" => cookie.same_site = Some(val.trim().to_string()),
                    _ => {}
                }
            }
        }
        Ok(cookie)
    }

    /// Identity key within a host's list. Saving a cookie replaces any
    /// existing cookie with the same key.
    pub fn identity_key(&self) -> (&str, &str) {
        (&self.name, &self.path)
    }

    /// Serialize as a standards-compliant Set-Cookie header value.
    pub fn to_set_cookie_string(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if !self.domain.is_empty() {
            out.push_str("; Domain=");
            out.push_str(&self.domain);
        }
        out.push_str("; Path=");
        out.push_str(&self.path);
        if let Some(expires) = self.expires {
            out.push_str("; Expires=");
            out.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if let Some(max_age) = self.max_age {
            out.push_str("; Max-Age=");
            out.push_str(&max_age.to_string());
        }
        if let Some(same_site) = &self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// External persistence collaborator for stored cookies. Invoked with the
/// request URI and a `"Set-cookie"` header mapping; this crate does not
/// define the persistence format beyond the serialized cookie string.
pub trait CookieSink: Send + Sync {
    fn put(&self, uri: &str, headers: HashMap<String, Vec<String>>) -> io::Result<()>;
}

/// Sink that drops everything. Default when the host supplies none.
pub struct NullSink;

impl CookieSink for NullSink {
    fn put(&self, _uri: &str, _headers: HashMap<String, Vec<String>>) -> io::Result<()> {
        Ok(())
    }
}

/// Per-host cookie store shared by all calls of a client instance.
///
/// All multi-step read-then-write sequences run under one lock per jar; the
/// backing store is a single shared structure, so serialization is per jar
/// rather than per host.
pub struct CookieJar {
    store: Mutex<HashMap<String, Vec<Cookie>>>,
    sink: Box<dyn CookieSink>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::with_sink(Box::new(NullSink))
    }

    pub fn with_sink(sink: Box<dyn CookieSink>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Merge response cookies into the host's list and forward each stored
    /// cookie to the persistence sink. Sink failures are logged and
    /// swallowed: saving a cookie must not fail the call that produced it.
    pub fn save_from_response(&self, request_url: &str, cookies: Vec<Cookie>) {
        let host = match Url::parse(request_url).ok().and_then(|u| u.host_str().map(normalize_host)) {
            Some(h) => h,
            None => {
                tracing::warn!(url = request_url, "discarding cookies for unparseable URL");
                return;
            }
        };

        let mut serialized = Vec::with_capacity(cookies.len());
        {
            let mut store = self.store.lock().expect("cookie jar mutex poisoned");
            let list = store.entry(host).or_default();
            for cookie in cookies {
                list.retain(|stored| stored.identity_key() != cookie.identity_key());
                serialized.push(cookie.to_set_cookie_string());
                list.push(cookie);
            }
        }

        // Forward outside the lock; the sink is best-effort.
        for line in serialized {
            let mut headers = HashMap::new();
            headers.insert("Set-cookie".to_string(), vec![line]);
            if let Err(e) = self.sink.put(request_url, headers) {
                tracing::warn!(url = request_url, error = %e, "cookie persistence failed");
            }
        }
    }

    /// Parse Set-Cookie headers from a response and store them.
    pub fn save_from_headers(&self, request_url: &str, set_cookie_values: &[String]) {
        let cookies: Vec<Cookie> = set_cookie_values
            .iter()
            .filter_map(|v| Cookie::from_set_cookie_header(v, request_url).ok())
            .collect();
        if !cookies.is_empty() {
            self.save_from_response(request_url, cookies);
        }
    }

    /// Current cookie list for the URL's host; empty if none recorded.
    /// Never fails: an unparseable URL simply yields no cookies.
    pub fn load_for_request(&self, request_url: &str) -> Vec<Cookie> {
        let host = match Url::parse(request_url).ok().and_then(|u| u.host_str().map(normalize_host)) {
            Some(h) => h,
            None => return Vec::new(),
        };
        let store = self.store.lock().expect("cookie jar mutex poisoned");
        store.get(&host).cloned().unwrap_or_default()
    }

    /// Build the Cookie request header for a URL, if any cookies apply.
    pub fn cookie_header(&self, request_url: &str) -> Option<String> {
        let cookies = self.load_for_request(request_url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Name→value mapping for a domain. Accepts a full URL or a bare
    /// authority; a leading `www.` is stripped before lookup.
    pub fn get_cookies(&self, domain: &str) -> Result<HashMap<String, String>> {
        let host = parse_lookup_domain(domain)?;
        let store = self.store.lock().expect("cookie jar mutex poisoned");
        let mut map = HashMap::new();
        if let Some(cookies) = store.get(&host) {
            for cookie in cookies {
                map.insert(cookie.name.clone(), cookie.value.clone());
            }
        }
        Ok(map)
    }

    /// Remove every cookie with the given name across all hosts. No-op if
    /// the name is absent anywhere.
    pub fn remove_cookie_by_name(&self, name: &str) {
        let mut store = self.store.lock().expect("cookie jar mutex poisoned");
        for cookies in store.values_mut() {
            cookies.retain(|c| c.name != name);
        }
    }

    /// Total number of stored cookies.
    pub fn len(&self) -> usize {
        let store = self.store.lock().expect("cookie jar mutex poisoned");
        store.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_host(host: &str) -> String {
    host.strip_prefix('.').unwrap_or(host).to_ascii_lowercase()
}

/// Resolve a lookup domain to a jar key: parse as URL or bare authority,
/// then strip one leading `www.`.
fn parse_lookup_domain(domain: &str) -> Result<String> {
    let host = if domain.contains("://") {
        Url::parse(domain)
            .map_err(|e| Error::DomainParse(format!("{domain}: {e}")))?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| Error::DomainParse(format!("{domain}: no host")))?
    } else {
        url::Host::parse(domain)
            .map_err(|e| Error::DomainParse(format!("{domain}: {e}")))?
            .to_string()
    };
    let host = normalize_host(&host);
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%y %H:%M:%S GMT",
        "%Y-%m-%dT%H:%M:%SZ",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(dt.and_utc());
        }
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_set_cookie_attributes() {
        let cookie = Cookie::from_set_cookie_header(
            "session=abc123; Path=/api; Domain=example.com; Secure; HttpOnly; SameSite=Lax",
            "https://www.example.com/login",
        )
        .unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.path, "/api");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn test_parse_set_cookie_rejects_malformed() {
        assert!(Cookie::from_set_cookie_header("no-equals-sign", "https://example.com").is_err());
        assert!(Cookie::from_set_cookie_header("=value", "https://example.com").is_err());
    }

    #[test]
    fn test_set_cookie_string_round_trip() {
        let mut cookie = Cookie::new("id", "42", "example.com");
        cookie.secure = true;
        let line = cookie.to_set_cookie_string();
        assert!(line.starts_with("id=42"));
        assert!(line.contains("Domain=example.com"));
        assert!(line.contains("Path=/"));
        assert!(line.contains("Secure"));

        let parsed = Cookie::from_set_cookie_header(&line, "https://example.com").unwrap();
        assert_eq!(parsed.name, "id");
        assert_eq!(parsed.value, "42");
        assert!(parsed.secure);
    }

    #[test]
    fn test_save_replaces_same_name_and_path() {
        let jar = CookieJar::new();
        jar.save_from_response(
            "https://example.com/",
            vec![Cookie::new("token", "old", "example.com")],
        );
        jar.save_from_response(
            "https://example.com/",
            vec![Cookie::new("token", "new", "example.com")],
        );

        let cookies = jar.load_for_request("https://example.com/");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "new");
    }

    #[test]
    fn test_save_keeps_distinct_paths() {
        let jar = CookieJar::new();
        let mut a = Cookie::new("token", "one", "example.com");
        a.path = "/a".to_string();
        let mut b = Cookie::new("token", "two", "example.com");
        b.path = "/b".to_string();
        jar.save_from_response("https://example.com/", vec![a, b]);

        assert_eq!(jar.load_for_request("https://example.com/").len(), 2);
    }

    #[test]
    fn test_load_for_unknown_host_is_empty() {
        let jar = CookieJar::new();
        assert!(jar.load_for_request("https://nowhere.test/").is_empty());
        assert!(jar.load_for_request("not a url").is_empty());
    }

    #[test]
    fn test_get_cookies_strips_www() {
        let jar = CookieJar::new();
        jar.save_from_response(
            "https://example.com/",
            vec![Cookie::new("a", "1", "example.com")],
        );

        let plain = jar.get_cookies("example.com").unwrap();
        let www = jar.get_cookies("www.example.com").unwrap();
        let full = jar.get_cookies("https://www.example.com/path").unwrap();
        assert_eq!(plain, www);
        assert_eq!(plain, full);
        assert_eq!(plain.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_get_cookies_rejects_malformed_domain() {
        let jar = CookieJar::new();
        let err = jar.get_cookies("exa mple com").unwrap_err();
        assert!(matches!(err, Error::DomainParse(_)));
    }

    #[test]
    fn test_remove_cookie_by_name_spans_hosts() {
        let jar = CookieJar::new();
        jar.save_from_response(
            "https://one.test/",
            vec![Cookie::new("x", "1", "one.test"), Cookie::new("y", "2", "one.test")],
        );
        jar.save_from_response(
            "https://two.test/",
            vec![Cookie::new("x", "3", "two.test")],
        );

        jar.remove_cookie_by_name("x");

        assert!(jar.get_cookies("one.test").unwrap().get("x").is_none());
        assert!(jar.get_cookies("two.test").unwrap().get("x").is_none());
        assert_eq!(jar.get_cookies("one.test").unwrap().get("y").map(String::as_str), Some("2"));

        // Removing an absent name is a no-op, not an error.
        jar.remove_cookie_by_name("never-stored");
    }

    #[test]
    fn test_sink_receives_set_cookie_mapping() {
        struct CountingSink(Arc<AtomicUsize>);
        impl CookieSink for CountingSink {
            fn put(&self, uri: &str, headers: HashMap<String, Vec<String>>) -> io::Result<()> {
                assert!(uri.starts_with("https://example.com"));
                assert!(headers.contains_key("Set-cookie"));
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let jar = CookieJar::with_sink(Box::new(CountingSink(count.clone())));
        jar.save_from_response(
            "https://example.com/",
            vec![Cookie::new("a", "1", "example.com"), Cookie::new("b", "2", "example.com")],
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sink_failure_does_not_fail_save() {
        struct FailingSink;
        impl CookieSink for FailingSink {
            fn put(&self, _: &str, _: HashMap<String, Vec<String>>) -> io::Result<()> {
                Err(io::Error::other("disk full"))
            }
        }

        let jar = CookieJar::with_sink(Box::new(FailingSink));
        jar.save_from_response(
            "https://example.com/",
            vec![Cookie::new("a", "1", "example.com")],
        );
        // Cookie is stored even though persistence failed.
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn test_save_from_headers_parses_and_stores() {
        let jar = CookieJar::new();
        jar.save_from_headers(
            "https://example.com/",
            &["sid=abc; Path=/".to_string(), "garbage".to_string()],
        );
        let cookies = jar.get_cookies("example.com").unwrap();
        assert_eq!(cookies.get("sid").map(String::as_str), Some("abc"));
        assert_eq!(cookies.len(), 1);
    }
}
