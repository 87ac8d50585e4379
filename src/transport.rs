//! Transport boundary.
//!
//! A [`Transport`] issues HTTP requests. [`MockTransport`] sits in front of a
//! real one and answers from a [`MockRegistry`] whenever the registry is active.

use crate::config::UnmatchedPolicy;
use crate::error::{MockPlugError, Result};
use crate::registry::MockRegistry;
use crate::response::{MockResponse, TransportMeta};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlugRequest {
    pub verb: String,
    pub uri: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl PlugRequest {
    pub fn new(verb: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            uri: uri.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A response as seen by the API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlugResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
    #[serde(flatten)]
    pub transport: TransportMeta,
}

impl From<MockResponse> for PlugResponse {
    fn from(mock: MockResponse) -> Self {
        Self {
            status: mock.status,
            headers: mock.headers,
            body: mock.body,
            transport: mock.transport,
        }
    }
}

/// Something that can perform a request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, request: &PlugRequest) -> Result<PlugResponse>;
}

/// Placeholder fallback for a [`MockTransport`] with no real transport behind it.
pub struct NoTransport;

#[async_trait]
impl Transport for NoTransport {
    async fn invoke(&self, request: &PlugRequest) -> Result<PlugResponse> {
        Err(MockPlugError::Transport(format!(
            "no transport configured for {} {}",
            request.verb, request.uri
        )))
    }
}

/// Answers requests from a registry, falling back to another transport.
pub struct MockTransport<T = NoTransport> {
    registry: Arc<MockRegistry>,
    fallback: Option<T>,
    policy: UnmatchedPolicy,
}

impl MockTransport<NoTransport> {
    /// Intercept with no fallback; the policy comes from the registry settings.
    pub fn new(registry: Arc<MockRegistry>) -> Self {
        let policy = registry.settings().unmatched;
        Self {
            registry,
            fallback: None,
            policy,
        }
    }
}

impl<T: Transport> MockTransport<T> {
    /// Intercept in front of `fallback`; the policy comes from the registry settings.
    pub fn with_fallback(registry: Arc<MockRegistry>, fallback: T) -> Self {
        let policy = registry.settings().unmatched;
        Self {
            registry,
            fallback: Some(fallback),
            policy,
        }
    }

    pub fn with_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<MockRegistry> {
        &self.registry
    }

    async fn fall_through(&self, request: &PlugRequest) -> Result<PlugResponse> {
        match &self.fallback {
            Some(transport) => transport.invoke(request).await,
            None => Err(unmatched(request)),
        }
    }
}

fn unmatched(request: &PlugRequest) -> MockPlugError {
    MockPlugError::UnmatchedRequest {
        verb: request.verb.clone(),
        uri: request.uri.clone(),
    }
}

#[async_trait]
impl<T: Transport> Transport for MockTransport<T> {
    async fn invoke(&self, request: &PlugRequest) -> Result<PlugResponse> {
        if !self.registry.is_active() {
            return self.fall_through(request).await;
        }

        match self
            .registry
            .lookup(&request.verb, &request.uri, &request.headers)?
        {
            Some(mock) => Ok(mock.into()),
            None => match self.policy {
                UnmatchedPolicy::Fail => Err(unmatched(request)),
                UnmatchedPolicy::Passthrough => {
                    debug!(verb = %request.verb, uri = %request.uri, "Passing unmatched request through");
                    self.fall_through(request).await
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalSettings;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and answers 502.
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Arc<CountingTransport> {
        async fn invoke(&self, _request: &PlugRequest) -> Result<PlugResponse> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(PlugResponse {
                status: 502,
                headers: HashMap::new(),
                body: json!("upstream"),
                transport: TransportMeta::default(),
            })
        }
    }

    fn registry_with(policy: UnmatchedPolicy) -> Arc<MockRegistry> {
        let registry = MockRegistry::with_settings(GlobalSettings {
            unmatched: policy,
            ..GlobalSettings::default()
        });
        registry
            .register("GET", "http://h/hello", &HashMap::new(), json!("hi"))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_match_short_circuits() {
        let upstream = Arc::new(CountingTransport::default());
        let transport = MockTransport::with_fallback(
            registry_with(UnmatchedPolicy::Passthrough),
            Arc::clone(&upstream),
        );

        let response = transport
            .invoke(&PlugRequest::new("GET", "http://h/hello"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!("hi"));
        assert!(response.transport.is_empty());
        assert_eq!(upstream.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unmatched_fails_by_default() {
        let transport = MockTransport::new(registry_with(UnmatchedPolicy::Fail));
        let err = transport
            .invoke(&PlugRequest::new("GET", "http://h/other"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MockPlugError::UnmatchedRequest {
                verb: "GET".to_string(),
                uri: "http://h/other".to_string(),
            }
        );
        assert!(transport
            .registry()
            .verify_called("GET", "http://h/other", &HashMap::new())
            .unwrap());
    }

    #[tokio::test]
    async fn test_unmatched_passthrough() {
        let upstream = Arc::new(CountingTransport::default());
        let transport = MockTransport::with_fallback(
            registry_with(UnmatchedPolicy::Fail),
            Arc::clone(&upstream),
        )
        .with_policy(UnmatchedPolicy::Passthrough);

        let response = transport
            .invoke(&PlugRequest::new("GET", "http://h/other").with_header("Accept", "*/*"))
            .await
            .unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(upstream.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_passthrough_without_fallback() {
        let transport = MockTransport::new(registry_with(UnmatchedPolicy::Passthrough));
        let err = transport
            .invoke(&PlugRequest::new("GET", "http://h/other"))
            .await
            .unwrap_err();
        assert!(matches!(err, MockPlugError::UnmatchedRequest { .. }));
    }

    #[tokio::test]
    async fn test_inactive_registry_bypasses_lookup() {
        let registry = Arc::new(MockRegistry::new());
        let upstream = Arc::new(CountingTransport::default());
        let transport = MockTransport::with_fallback(Arc::clone(&registry), Arc::clone(&upstream));

        let response = transport
            .invoke(&PlugRequest::new("GET", "http://h/hello"))
            .await
            .unwrap();
        assert_eq!(response.status, 502);
        assert!(!registry.verify_any_call());

        let err = MockTransport::new(registry)
            .invoke(&PlugRequest::new("GET", "http://h/hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, MockPlugError::UnmatchedRequest { .. }));
    }

    #[tokio::test]
    async fn test_invalid_uri_propagates() {
        let transport = MockTransport::new(registry_with(UnmatchedPolicy::Fail));
        let err = transport
            .invoke(&PlugRequest::new("GET", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, MockPlugError::InvalidRequestDescriptor { .. }));
    }
}
