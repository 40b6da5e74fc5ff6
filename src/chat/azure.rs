//! Azure OpenAI chat-completions backend.
//!
//! API documentation: <https://learn.microsoft.com/azure/ai-services/openai/reference>

use async_trait::async_trait;

use crate::chat::{BackendError, ChatBackend, CompletionRequest};
use crate::config::{ConfigError, Settings};
use crate::utils::{HttpClient, DEFAULT_USER_AGENT};

/// One Azure OpenAI deployment
#[derive(Debug, Clone)]
pub struct AzureOpenAiBackend {
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
    http: HttpClient,
}

impl AzureOpenAiBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        deployment: impl Into<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            deployment: deployment.into(),
            http,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate_chat()?;
        let openai = &settings.openai;
        let http = HttpClient::with_settings(DEFAULT_USER_AGENT, &settings.http)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(Self::new(
            openai.endpoint.clone().unwrap_or_default(),
            openai.api_key.clone().unwrap_or_default(),
            openai.api_version.clone().unwrap_or_default(),
            openai.model_name.clone(),
            http,
        ))
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions`
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint,
            urlencoding::encode(&self.deployment)
        )
    }
}

#[async_trait]
impl ChatBackend for AzureOpenAiBackend {
    fn model_id(&self) -> &str {
        &self.deployment
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model":                 &self.deployment,
            "messages":              request.messages,
            "max_completion_tokens": request.max_completion_tokens,
            "temperature":           request.temperature,
        });

        let resp = self
            .http
            .post(&self.completions_url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let json = check_response_status(resp).await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(BackendError::EmptyResponse)
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, BackendError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let body: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);

    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err(BackendError::Api { status, message });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use mockito::{Matcher, Server};

    fn backend(url: &str) -> AzureOpenAiBackend {
        AzureOpenAiBackend::new(
            url,
            "secret",
            "2024-12-01-preview",
            "gpt-4.1-mini",
            HttpClient::new().unwrap(),
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("ping")],
            max_completion_tokens: 100,
            temperature: 0.01,
        }
    }

    #[tokio::test]
    async fn test_complete() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/deployments/gpt-4.1-mini/chat/completions")
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                "2024-12-01-preview".into(),
            ))
            .match_header("api-key", "secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "max_completion_tokens": 100,
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "ping"}
                ]
            })))
            .with_status(200)
            .with_body(r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}}]}"#)
            .create_async()
            .await;

        let reply = backend(&server.url()).complete(request()).await.unwrap();
        assert_eq!(reply, "pong");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error": {"code": "401", "message": "Access denied due to invalid subscription key."}}"#)
            .create_async()
            .await;

        let err = backend(&server.url()).complete(request()).await.unwrap_err();
        match err {
            BackendError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.starts_with("Access denied"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_content() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#)
            .create_async()
            .await;

        let err = backend(&server.url()).complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse));
    }
}
