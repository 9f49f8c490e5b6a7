//! The composed HTTP client: trust-configured connector, shared cookie jar,
//! timeouts, and the tag-keyed call registry.
//!
//! Every fetch is one independent asynchronous unit with a single
//! resolution: exactly one of success, failure, or cancellation. The
//! registry tracks calls from registration until their future settles so
//! that `cancel(tag)` can reach both queued and running work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::request::BuiltRequest;
use crate::response::Response;
use crate::timeouts::Timeouts;
use crate::transport::{H1Connection, TlsConnector};

/// Lifecycle of one call. Cancellation is only observable from `Queued` or
/// `Running`; once a call is `Completed` or `Failed`, cancel is a no-op for
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct CallEntry {
    id: u64,
    tag: Option<String>,
    state: CallState,
    token: CancellationToken,
}

/// Registry of in-flight calls, keyed by their opaque tag.
#[derive(Clone, Default)]
pub struct CallRegistry {
    inner: Arc<Mutex<Vec<CallEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, tag: Option<String>) -> CallGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut calls = self.inner.lock().expect("call registry mutex poisoned");
        calls.push(CallEntry {
            id,
            tag,
            state: CallState::Queued,
            token: token.clone(),
        });
        CallGuard {
            registry: self.clone(),
            id,
            token,
        }
    }

    fn set_state(&self, id: u64, state: CallState) {
        let mut calls = self.inner.lock().expect("call registry mutex poisoned");
        if let Some(entry) = calls.iter_mut().find(|e| e.id == id) {
            entry.state = state;
        }
    }

    fn remove(&self, id: u64) {
        let mut calls = self.inner.lock().expect("call registry mutex poisoned");
        calls.retain(|e| e.id != id);
    }

    /// Signal cancellation to every queued or running call whose tag equals
    /// the given tag. No-op if nothing matches.
    pub fn cancel(&self, tag: &str) {
        let calls = self.inner.lock().expect("call registry mutex poisoned");
        for entry in calls.iter() {
            let matches = entry.tag.as_deref() == Some(tag)
                && matches!(entry.state, CallState::Queued | CallState::Running);
            if matches {
                entry.token.cancel();
            }
        }
    }

    /// Number of calls not yet settled.
    pub fn in_flight(&self) -> usize {
        let calls = self.inner.lock().expect("call registry mutex poisoned");
        calls
            .iter()
            .filter(|e| matches!(e.state, CallState::Queued | CallState::Running))
            .count()
    }
}

/// Removes the registry entry once the call future settles, whatever path
/// it took out.
struct CallGuard {
    registry: CallRegistry,
    id: u64,
    token: CancellationToken,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Certificate-pinning HTTP client with a shared per-host cookie jar.
pub struct HttpClient {
    connector: TlsConnector,
    jar: Arc<CookieJar>,
    timeouts: Timeouts,
    registry: CallRegistry,
}

impl HttpClient {
    pub fn new(connector: TlsConnector, jar: Arc<CookieJar>, timeouts: Timeouts) -> Self {
        Self {
            connector,
            jar,
            timeouts,
            registry: CallRegistry::new(),
        }
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    /// Cancel every queued or running call carrying this tag.
    pub fn cancel(&self, tag: &str) {
        self.registry.cancel(tag);
    }

    /// Execute a built request, racing it against its cancellation token.
    ///
    /// Resolves exactly once: `Ok(response)`, a failure, or
    /// `Err(Error::Cancelled)` when the call's tag was cancelled before the
    /// transport finished. A cancellation that loses the race to an
    /// already-finished transport result does not suppress that result.
    pub async fn fetch(&self, request: BuiltRequest) -> Result<Response> {
        let guard = self.registry.register(request.tag.clone());
        let token = guard.token.clone();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = self.execute(guard.id, &request) => result,
        };

        let terminal = match &result {
            Ok(_) => CallState::Completed,
            Err(Error::Cancelled) => CallState::Cancelled,
            Err(_) => CallState::Failed,
        };
        self.registry.set_state(guard.id, terminal);
        result
    }

    async fn execute(&self, id: u64, request: &BuiltRequest) -> Result<Response> {
        self.registry.set_state(id, CallState::Running);

        let mut headers = request.headers.clone();
        if let Some(content_type) = &request.content_type {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
        if let Some(cookie_header) = self.jar.cookie_header(&request.url) {
            headers.push(("Cookie".to_string(), cookie_header));
        }

        // Wire-level body logging stays out of release builds: leaking
        // pinned-traffic contents to logs defeats the point of pinning.
        if cfg!(debug_assertions) {
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                body = %request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
                "sending request"
            );
        }

        let stream = self
            .connector
            .connect(&request.uri, self.timeouts.connect)
            .await?;
        let mut connection =
            H1Connection::new(stream, self.timeouts.read, self.timeouts.write);
        let response = connection
            .send_request(&request.method, &request.uri, &headers, request.body.as_ref())
            .await?;

        let set_cookies: Vec<String> = response
            .get_headers("set-cookie")
            .into_iter()
            .map(str::to_string)
            .collect();
        if !set_cookies.is_empty() {
            self.jar.save_from_headers(&request.url, &set_cookies);
        }

        if cfg!(debug_assertions) {
            tracing::debug!(
                status = response.status,
                body = %String::from_utf8_lossy(response.body()),
                "received response"
            );
        }

        Ok(response)
    }
}
