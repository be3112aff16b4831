//! Minimal Gemini REST client: model listing, batch embeddings, generation.
//!
//! Auth is the `?key=` query parameter. Every call goes through
//! [`with_retry`] so timeouts, connect errors, 429 and 5xx are retried with
//! backoff; anything else fails at once as an external-service error.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use docqa_core::config::{HttpSettings, ModelSettings};
use docqa_core::{Error, Result};

use crate::model_select::{normalize_model_name, ModelCatalog};
use crate::retry::{with_retry, CallError, RetryPolicy};

/// Upper bound on texts per `batchEmbedContents` request.
pub const MAX_EMBED_BATCH: usize = 100;

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Fails with a configuration error when the credential is missing or blank.
    pub fn new(models: &ModelSettings, http: &HttpSettings) -> Result<Self> {
        let api_key = models
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Configuration("models.api_key is not set".into()))?
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http: client,
            base_url: models.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::from(http),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}?key={}", self.base_url, normalize_model_name(model), method, self.api_key)
    }

    /// Names of every model the key can see (paged).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!("{}/models?key={}&pageSize=1000", self.base_url, self.api_key);
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }
            let body = self.request(Method::GET, &url, None).await?;
            names.extend(parse_model_names(&body));
            page_token = body.get("nextPageToken").and_then(Value::as_str).map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(names)
    }

    /// One vector per input text, in order. Splits into requests of at most
    /// [`MAX_EMBED_BATCH`] texts.
    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.model_url(model, "batchEmbedContents");
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            debug!(model, batch = batch.len(), "embedding batch");
            let body = embed_request(model, batch);
            let resp = self.request(Method::POST, &url, Some(&body)).await?;
            let vectors = parse_embeddings(&resp)?;
            if vectors.len() != batch.len() {
                return Err(Error::ExternalService(format!(
                    "embedding service returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    pub async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let url = self.model_url(model, "generateContent");
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature }
        });
        debug!(model, prompt_chars = prompt.len(), "generating answer");
        let resp = self.request(Method::POST, &url, Some(&body)).await?;
        parse_generated_text(&resp)
    }

    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        with_retry(&self.retry, move || self.call(method.clone(), url, body))
            .await
            .map_err(Error::from)
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> std::result::Result<Value, CallError> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::Transient(format!("failed to read Gemini response: {}", e.without_url())))?;
        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| CallError::Fatal(format!("invalid JSON from Gemini API: {e}")))
    }
}

#[async_trait]
impl ModelCatalog for GeminiClient {
    async fn list_models(&self) -> Result<Vec<String>> {
        GeminiClient::list_models(self).await
    }
}

fn classify_transport_error(err: reqwest::Error) -> CallError {
    let transient = err.is_timeout() || err.is_connect() || err.is_request();
    // the URL carries the key
    let msg = format!("request to Gemini API failed: {}", err.without_url());
    if transient {
        CallError::Transient(msg)
    } else {
        CallError::Fatal(msg)
    }
}

pub(crate) fn map_http_error(status: StatusCode, body: &str) -> CallError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(300).collect());
    let msg = format!("HTTP {} from Gemini API: {}", status.as_u16(), detail);
    match status.as_u16() {
        429 | 500..=599 => CallError::Transient(msg),
        _ => CallError::Fatal(msg),
    }
}

pub(crate) fn embed_request(model: &str, texts: &[String]) -> Value {
    let model = format!("models/{}", normalize_model_name(model));
    let requests: Vec<Value> = texts
        .iter()
        .map(|t| json!({ "model": model, "content": { "parts": [{ "text": t }] } }))
        .collect();
    json!({ "requests": requests })
}

pub(crate) fn parse_model_names(body: &Value) -> Vec<String> {
    body.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_embeddings(body: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = body
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ExternalService("embedding response has no 'embeddings' field".into()))?;
    embeddings
        .iter()
        .map(|e| {
            e.get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().filter_map(Value::as_f64).map(|x| x as f32).collect())
                .ok_or_else(|| Error::ExternalService("embedding entry has no 'values'".into()))
        })
        .collect()
}

pub(crate) fn parse_generated_text(body: &Value) -> Result<String> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            Error::ExternalService(format!("generation returned no content ({reason})"))
        })?;
    let text: String = parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
    if text.trim().is_empty() {
        return Err(Error::ExternalService("generation returned empty text".into()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_key_is_configuration_error() {
        let http = HttpSettings::default();
        let mut models = ModelSettings::default();
        assert_eq!(GeminiClient::new(&models, &http).unwrap_err().kind(), docqa_core::ErrorKind::Configuration);
        models.api_key = Some("   ".into());
        assert_eq!(GeminiClient::new(&models, &http).unwrap_err().kind(), docqa_core::ErrorKind::Configuration);
        models.api_key = Some("k".into());
        assert!(GeminiClient::new(&models, &http).is_ok());
    }

    #[test]
    fn model_url_normalizes_prefix() {
        let models = ModelSettings { api_key: Some("secret".into()), ..Default::default() };
        let client = GeminiClient::new(&models, &HttpSettings::default()).unwrap();
        assert_eq!(
            client.model_url("models/text-embedding-004", "batchEmbedContents"),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:batchEmbedContents?key=secret"
        );
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[test]
    fn http_status_classification() {
        assert!(matches!(map_http_error(StatusCode::TOO_MANY_REQUESTS, ""), CallError::Transient(_)));
        assert!(matches!(map_http_error(StatusCode::SERVICE_UNAVAILABLE, ""), CallError::Transient(_)));
        assert!(matches!(map_http_error(StatusCode::UNAUTHORIZED, ""), CallError::Fatal(_)));
        let err = map_http_error(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad model"}}"#);
        assert_eq!(err, CallError::Fatal("HTTP 400 from Gemini API: bad model".into()));
    }

    #[test]
    fn embed_request_shape() {
        let body = embed_request("text-embedding-004", &["a".into(), "b".into()]);
        assert_eq!(body["requests"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["requests"][0]["model"], "models/text-embedding-004");
        assert_eq!(body["requests"][1]["content"]["parts"][0]["text"], "b");
    }

    #[test]
    fn parses_responses() {
        let body = json!({ "embeddings": [{ "values": [0.5, -1.0] }, { "values": [0.0, 2.0] }] });
        assert_eq!(parse_embeddings(&body).unwrap(), vec![vec![0.5, -1.0], vec![0.0, 2.0]]);
        assert!(parse_embeddings(&json!({})).is_err());

        let body = json!({ "models": [{ "name": "models/gemini-2.5-flash" }, { "name": "models/text-embedding-004" }] });
        assert_eq!(parse_model_names(&body), vec!["models/gemini-2.5-flash", "models/text-embedding-004"]);

        let body = json!({ "candidates": [{ "content": { "parts": [{ "text": "Re" }, { "text": "entrancy" }] } }] });
        assert_eq!(parse_generated_text(&body).unwrap(), "Reentrancy");
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_generated_text(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
