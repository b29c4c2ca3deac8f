//! NLU collaborator client.
//!
//! The external NLU service analyzes one utterance with context hints
//! (recent topics, language preference) and returns an intent name,
//! confidence, and extracted entities. "No intent found" is a valid
//! answer and is distinct from a transport or service failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

/// Default per-call timeout for the NLU collaborator.
pub const DEFAULT_NLU_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from the NLU collaborator.
#[derive(Debug, thiserror::Error)]
pub enum NluError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("NLU transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the service.
    #[error("NLU service returned status {0}")]
    Status(u16),

    /// Response body did not match the expected shape.
    #[error("NLU response malformed: {0}")]
    Malformed(String),
}

/// One analysis request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NluRequest {
    /// The utterance to analyze.
    pub text: String,
    /// Language code hint (BCP 47), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    /// Recent conversation topics, newest last.
    #[serde(default)]
    pub recent_topics: Vec<String>,
}

/// A successful analysis.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluAnalysis {
    /// Resolved intent name (dotted `capability.action` form).
    pub intent_name: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Extracted entities, name → value.
    #[serde(default)]
    pub entities: HashMap<String, Value>,
}

/// The NLU collaborator contract.
///
/// `Ok(None)` means the service answered but found no intent; `Err` means
/// the service could not answer (timeout, 5xx, malformed response).
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Analyze one utterance.
    async fn analyze(&self, request: &NluRequest) -> Result<Option<NluAnalysis>, NluError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    intent_name: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    entities: HashMap<String, Value>,
}

/// HTTP client for the NLU collaborator.
pub struct HttpNluClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpNluClient {
    /// Create a client against `base_url` (the service exposes
    /// `POST {base_url}/analyze`) with the given per-call timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NluError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/analyze", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl NluClient for HttpNluClient {
    #[instrument(skip_all, fields(text_len = request.text.len()))]
    async fn analyze(&self, request: &NluRequest) -> Result<Option<NluAnalysis>, NluError> {
        let response = self.http.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NluError::Status(status.as_u16()));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| NluError::Malformed(e.to_string()))?;

        match wire.intent_name {
            Some(name) if !name.is_empty() => Ok(Some(NluAnalysis {
                intent_name: name,
                confidence: wire.confidence,
                entities: wire.entities,
            })),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(text: &str) -> NluRequest {
        NluRequest {
            text: text.to_string(),
            language_code: Some("ko-KR".to_string()),
            recent_topics: vec!["weather".to_string()],
        }
    }

    #[tokio::test]
    async fn analyze_maps_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(json!({"text": "오늘 날씨 어때?"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "intentName": "weather.query",
                "confidence": 0.95,
                "entities": {"date": "today"}
            })))
            .mount(&server)
            .await;

        let client = HttpNluClient::new(&server.uri(), DEFAULT_NLU_TIMEOUT).unwrap();
        let analysis = client
            .analyze(&request("오늘 날씨 어때?"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.intent_name, "weather.query");
        assert_eq!(analysis.confidence, 0.95);
        assert_eq!(analysis.entities["date"], json!("today"));
    }

    #[tokio::test]
    async fn analyze_null_intent_is_no_intent_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "intentName": null,
                "confidence": 0.0
            })))
            .mount(&server)
            .await;

        let client = HttpNluClient::new(&server.uri(), DEFAULT_NLU_TIMEOUT).unwrap();
        assert!(client.analyze(&request("asdfgh")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analyze_5xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpNluClient::new(&server.uri(), DEFAULT_NLU_TIMEOUT).unwrap();
        let err = client.analyze(&request("hi")).await.unwrap_err();
        assert!(matches!(err, NluError::Status(503)));
    }

    #[tokio::test]
    async fn analyze_malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = HttpNluClient::new(&server.uri(), DEFAULT_NLU_TIMEOUT).unwrap();
        let err = client.analyze(&request("hi")).await.unwrap_err();
        assert!(matches!(err, NluError::Malformed(_)));
    }

    #[tokio::test]
    async fn analyze_timeout_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"intentName": "weather.query", "confidence": 0.9}))
                    .set_delay(Duration::from_millis(250)),
            )
            .mount(&server)
            .await;

        let client = HttpNluClient::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.analyze(&request("hi")).await.unwrap_err();
        assert!(matches!(err, NluError::Transport(_)));
    }
}
