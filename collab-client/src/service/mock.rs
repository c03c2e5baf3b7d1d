//! Mock pairing service for testing.
//!
//! Replies are queued as raw JSON bodies and decoded exactly like the HTTP
//! service decodes them.

use super::{PairingService, ServiceError};
use async_trait::async_trait;
use collab_core::pairing::{await_path, hello_path};
use collab_types::{HelloResponse, RawPairing, UserId, WireError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock pairing service for testing.
///
/// An empty await queue behaves like a long poll nobody answers: the call
/// never resolves.
#[derive(Debug, Default, Clone)]
pub struct MockPairingService {
    inner: Arc<Mutex<MockServiceInner>>,
}

#[derive(Debug, Default)]
struct MockServiceInner {
    hello_replies: VecDeque<String>,
    pairing_replies: VecDeque<String>,
    script: Option<String>,
    requests: Vec<String>,
    fail_next_hello: Option<String>,
    fail_next_await: Option<String>,
    fail_next_fetch: Option<String>,
}

impl MockPairingService {
    /// Create a mock with no queued replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `/hello` body.
    pub fn queue_hello(&self, body: &str) {
        self.lock().hello_replies.push_back(body.to_string());
    }

    /// Queue an `/await-collaboration` body.
    pub fn queue_pairing(&self, body: &str) {
        self.lock().pairing_replies.push_back(body.to_string());
    }

    /// Set the engine script served by `fetch_script`.
    pub fn set_script(&self, source: &str) {
        self.lock().script = Some(source.to_string());
    }

    /// Every route requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Cause the next hello to fail with the given error.
    pub fn fail_next_hello(&self, error: &str) {
        self.lock().fail_next_hello = Some(error.to_string());
    }

    /// Cause the next await to fail with the given error.
    pub fn fail_next_await(&self, error: &str) {
        self.lock().fail_next_await = Some(error.to_string());
    }

    /// Cause the next script fetch to fail with the given error.
    pub fn fail_next_fetch(&self, error: &str) {
        self.lock().fail_next_fetch = Some(error.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, MockServiceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn request_error(path: &str, reason: String) -> ServiceError {
    ServiceError::Request {
        path: path.to_string(),
        reason,
    }
}

#[async_trait]
impl PairingService for MockPairingService {
    async fn hello(&self, version: &str) -> Result<HelloResponse, ServiceError> {
        let path = hello_path(version);
        let body = {
            let mut inner = self.lock();
            inner.requests.push(path.clone());

            // Check for forced failure
            if let Some(error) = inner.fail_next_hello.take() {
                return Err(request_error(&path, error));
            }
            inner.hello_replies.pop_front()
        };

        let body = body.ok_or_else(|| request_error(&path, "no reply queued".into()))?;
        Ok(HelloResponse::from_json(&body)?)
    }

    async fn await_collaboration(&self, user: &UserId) -> Result<RawPairing, ServiceError> {
        let path = await_path(user);
        let body = {
            let mut inner = self.lock();
            inner.requests.push(path.clone());

            if let Some(error) = inner.fail_next_await.take() {
                return Err(request_error(&path, error));
            }
            inner.pairing_replies.pop_front()
        };

        match body {
            Some(body) => Ok(serde_json::from_str(&body).map_err(WireError::Malformed)?),
            None => std::future::pending().await,
        }
    }

    async fn fetch_script(&self, path: &str) -> Result<String, ServiceError> {
        let mut inner = self.lock();
        inner.requests.push(path.to_string());

        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(request_error(path, error));
        }
        inner.script.clone().ok_or_else(|| ServiceError::Status {
            path: path.to_string(),
            status: 404,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn queued_replies_are_decoded_in_order() {
        let service = MockPairingService::new();
        service.queue_hello(r#"{"userid":"u1"}"#);
        service.queue_hello(r#"{"userid":"u2"}"#);

        let first = service.hello("2.0").await.unwrap();
        let second = service.hello("2.0").await.unwrap();
        assert_eq!(first.user_id().unwrap(), UserId::new("u1"));
        assert_eq!(second.user_id().unwrap(), UserId::new("u2"));
        assert_eq!(service.requests(), vec!["/hello/2.0", "/hello/2.0"]);
    }

    #[tokio::test]
    async fn empty_hello_queue_is_an_error() {
        let service = MockPairingService::new();
        assert!(matches!(
            service.hello("2.0").await,
            Err(ServiceError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let service = MockPairingService::new();
        service.queue_pairing("not json");
        assert!(matches!(
            service.await_collaboration(&UserId::new("u1")).await,
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn empty_await_queue_never_resolves() {
        let service = MockPairingService::new();
        let user = UserId::new("u1");
        let result =
            tokio::time::timeout(Duration::from_millis(30), service.await_collaboration(&user))
                .await;
        assert!(result.is_err());
        assert_eq!(service.requests(), vec!["/await-collaboration/u1"]);
    }

    #[tokio::test]
    async fn forced_failures_apply_once() {
        let service = MockPairingService::new();
        service.set_script("engine();");
        service.fail_next_fetch("connection reset");

        assert!(service.fetch_script("/public/sharedb.js").await.is_err());
        assert_eq!(
            service.fetch_script("/public/sharedb.js").await.unwrap(),
            "engine();"
        );
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let service = MockPairingService::new();
        assert!(matches!(
            service.fetch_script("/public/sharedb.js").await,
            Err(ServiceError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let service = MockPairingService::new();
        let other = service.clone();
        other.queue_hello(r#"{"userid":"u1"}"#);
        assert!(service.hello("1.0").await.is_ok());
        assert_eq!(other.requests().len(), 1);
    }
}
