//! External provider client for the vending gateway.
//!
//! One call per charged attempt: `POST {base_url}/vend` with a bearer
//! credential. The client only reports what happened on the wire; deciding
//! whether a reply means "delivered" is left to [`ProviderResponse::classify`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{
    config::ProviderConfig,
    error::GENERIC_ERROR_MESSAGE,
    models::provider::{ProviderResponse, ProviderVendRequest},
};

/// Ways a provider call can fail before yielding a reply to classify.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider did not respond in time")]
    Timeout,

    /// Non-2xx reply. `message` is the best human-readable text found in the body.
    #[error("Provider returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    /// The call task died (panic or cancellation) before returning.
    #[error("Provider call aborted: {0}")]
    Aborted(String),
}

impl ProviderError {
    /// Text safe to show the buyer.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Timeout => "Service timed out, please retry".to_string(),
            ProviderError::Rejected { message, .. } => message.clone(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

/// The vending gateway, as the orchestrator sees it.
#[async_trait]
pub trait VendProvider: Send + Sync {
    async fn vend(&self, request: &ProviderVendRequest) -> Result<ProviderResponse, ProviderError>;
}

/// HTTP client for the vending gateway.
#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn vend_url(&self) -> Result<url::Url, ProviderError> {
        // Keep any path prefix on the base URL
        let mut base = self.config.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join("vend")
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

#[async_trait]
impl VendProvider for ProviderClient {
    #[tracing::instrument(skip(self, request), fields(reference = %request.user_reference))]
    async fn vend(&self, request: &ProviderVendRequest) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .http
            .post(self.vend_url()?)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        tracing::debug!(status = status.as_u16(), "Provider replied");

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| extract_error_message(&value))
                .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());

            tracing::warn!(status = status.as_u16(), %message, "Provider rejected vend");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        ProviderResponse::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Best human-readable message in an error body.
///
/// Fields are probed in order: `server_message`, `message`, `error` (string or
/// `{message}`), `detail`, `errors` (list of strings or `{message}`, or a map of
/// field to messages), then `text_status`.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let text = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let nested = |v: &Value| text(v).or_else(|| v.get("message").and_then(text));

    if let Some(message) = body.get("server_message").and_then(text) {
        return Some(message);
    }
    if let Some(message) = body.get("message").and_then(text) {
        return Some(message);
    }
    if let Some(message) = body.get("error").and_then(nested) {
        return Some(message);
    }
    if let Some(message) = body.get("detail").and_then(text) {
        return Some(message);
    }

    let errors: Vec<String> = match body.get("errors") {
        Some(Value::Array(items)) => items.iter().filter_map(nested).collect(),
        Some(Value::Object(fields)) => fields
            .values()
            .flat_map(|v| -> Vec<String> {
                match v {
                    Value::Array(items) => items.iter().filter_map(nested).collect(),
                    other => nested(other).into_iter().collect(),
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    if !errors.is_empty() {
        return Some(errors.join("; "));
    }

    body.get("text_status").and_then(text)
}

#[cfg(test)]
pub mod mock {
    //! Scripted provider for orchestrator tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    pub enum Scripted {
        Reply(Value),
        Fail(ProviderError),
        Panic,
    }

    #[derive(Default)]
    pub struct MockProvider {
        script: Mutex<VecDeque<Scripted>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        requests: Mutex<Vec<ProviderVendRequest>>,
    }

    impl MockProvider {
        pub fn replying(body: Value) -> Self {
            Self::scripted(vec![Scripted::Reply(body)])
        }

        pub fn failing(error: ProviderError) -> Self {
            Self::scripted(vec![Scripted::Fail(error)])
        }

        pub fn panicking() -> Self {
            Self::scripted(vec![Scripted::Panic])
        }

        pub fn scripted(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<ProviderVendRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VendProvider for MockProvider {
        async fn vend(
            &self,
            request: &ProviderVendRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(body)) => {
                    Ok(ProviderResponse::from_value(body).expect("scripted reply"))
                }
                Some(Scripted::Fail(error)) => Err(error),
                Some(Scripted::Panic) => panic!("provider exploded"),
                None => Err(ProviderError::Transport("no scripted reply".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    use crate::models::{service::ServiceCategory, transaction::VendContext};

    async fn serve(router: Router) -> url::Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        url::Url::parse(&format!("http://{addr}/api")).unwrap()
    }

    fn client(base_url: url::Url, timeout: Duration) -> ProviderClient {
        ProviderClient::new(ProviderConfig {
            base_url,
            api_key: "sk_provider".to_string(),
            timeout,
        })
        .unwrap()
    }

    fn request() -> ProviderVendRequest {
        let context = VendContext {
            category: ServiceCategory::Airtime,
            destination: Some("08031234567".to_string()),
            quantity: 1,
            amount: Some(dec!(500)),
        };
        ProviderVendRequest::new("MTN-VTU", "VND1", &context)
    }

    #[tokio::test]
    async fn test_successful_vend_is_parsed() {
        let router = Router::new().route(
            "/api/vend",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk_provider");
                assert_eq!(body["user_reference"], "VND1");
                Json(json!({
                    "status": true,
                    "text_status": "COMPLETED",
                    "data": { "true_response": "N500 airtime sent" }
                }))
            }),
        );
        let base = serve(router).await;

        let reply = client(base, Duration::from_secs(5))
            .vend(&request())
            .await
            .unwrap();
        assert!(reply.status);
        assert_eq!(reply.raw["text_status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_error_status_carries_provider_message() {
        let router = Router::new().route(
            "/api/vend",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "errors": { "destination": ["Invalid phone number"] } })),
                )
            }),
        );
        let base = serve(router).await;

        let err = client(base, Duration::from_secs(5))
            .vend(&request())
            .await
            .unwrap_err();
        match err {
            ProviderError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid phone number");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let router = Router::new().route(
            "/api/vend",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "status": true }))
            }),
        );
        let base = serve(router).await;

        let err = client(base, Duration::from_millis(100))
            .vend(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
        assert_eq!(err.user_message(), "Service timed out, please retry");
    }

    #[test]
    fn test_error_message_probe_order() {
        assert_eq!(
            extract_error_message(&json!({ "message": "m", "server_message": "s" })).as_deref(),
            Some("s")
        );
        assert_eq!(
            extract_error_message(&json!({ "error": { "message": "nested" } })).as_deref(),
            Some("nested")
        );
        assert_eq!(
            extract_error_message(&json!({ "detail": "Not authenticated" })).as_deref(),
            Some("Not authenticated")
        );
        assert_eq!(
            extract_error_message(&json!({ "errors": ["a", { "message": "b" }] })).as_deref(),
            Some("a; b")
        );
        assert_eq!(
            extract_error_message(&json!({ "text_status": "FAILED" })).as_deref(),
            Some("FAILED")
        );
        assert_eq!(extract_error_message(&json!({ "message": "  " })), None);
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = ProviderError::Transport("connection refused 10.0.0.4:443".to_string());
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
    }
}
