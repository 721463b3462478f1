//! Lazily built, self-healing HTTP client owned by one adapter.
//!
//! The underlying `reqwest::Client` is created on first use and shared by
//! every concurrent call of that adapter. A transport failure drops it so
//! the next call starts from a fresh connection pool. The failed call itself
//! is not retried.

use reqwest::{Method, RequestBuilder, Response};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{BackendError, BackendResult};
use crate::models::BackendKind;

pub struct LazyClient {
    backend: BackendKind,
    token: Option<String>,
    timeout: Duration,
    client: Mutex<Option<reqwest::Client>>,
}

impl LazyClient {
    pub fn new(backend: BackendKind, token: Option<String>, timeout: Duration) -> Self {
        Self {
            backend,
            token,
            timeout,
            client: Mutex::new(None),
        }
    }

    fn client(&self) -> BackendResult<reqwest::Client> {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("record-desk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::unavailable(self.backend, e.to_string()))?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Forget the current client; the next request builds a new one.
    pub fn invalidate(&self) {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn is_connected(&self) -> bool {
        self.client
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Start a request with the bearer credential attached.
    pub fn request(&self, method: Method, url: &str) -> BackendResult<RequestBuilder> {
        let builder = self.client()?.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Send a request. Transport failures invalidate the client and map to
    /// `Unavailable`; HTTP error statuses are left for the caller to judge.
    pub async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        match request.send().await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                tracing::warn!(backend = %self.backend, error = %e, "transport failure, dropping client");
                self.invalidate();
                Err(BackendError::from_transport(self.backend, e))
            }
        }
    }
}

/// Percent-encode one path segment or query value.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
