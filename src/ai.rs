//! Client for the chat-completion service behind the AI fallback.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};

const SYSTEM_PROMPT: &str = "You are a data analysis assistant. \
Answer questions about the dataset the user provides. \
Be concise and base your answer on the data shown.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AiClient {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// A client for the configured service, or `None` when no API key is set
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match &config.openai_api_key {
            Some(key) => Ok(Some(Self::new(key, &config.ai_api_base, &config.ai_model)?)),
            None => Ok(None),
        }
    }

    /// Ask a question about a dataset sample
    ///
    /// # Arguments
    /// * `sample_csv` - The first rows of the active dataset, as CSV
    /// * `question` - The user's chat message
    ///
    /// # Returns
    /// * The first completion's text, unmodified
    pub async fn ask(&self, sample_csv: &str, question: &str) -> Result<String> {
        let prompt = format!(
            "Here is a sample of the dataset (CSV):\n\n{}\n\nQuestion: {}",
            sample_csv, question
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Ai(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Ai(format!("API error ({}): {}", status, body)));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| AppError::Ai(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Ai("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::Regex("Question: why\\?".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Because."}}]}"#)
            .create_async()
            .await;

        let client = AiClient::new("sk-test", &server.url(), "test-model").unwrap();
        let answer = client.ask("a,b\n1,2\n", "why?").await.unwrap();

        assert_eq!(answer, "Because.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = AiClient::new("sk-test", &format!("{}/", server.url()), "m").unwrap();
        let err = client.ask("", "hi").await.unwrap_err();

        assert!(matches!(err, AppError::Ai(_)));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn no_key_means_no_client() {
        let config = Config::for_dirs("u", "c");
        assert!(AiClient::from_config(&config).unwrap().is_none());
    }
}
