//! Delegation to the external answer-generation service.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GenerationError;
use crate::models::GeneratorConfig;

/// Produces an answer from a query and its retrieved context. The core
/// never fabricates answers; this is the only place one comes from.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        query: &str,
        context: &str,
        route_hint: Option<&str>,
    ) -> Result<String, GenerationError>;

    fn identifier(&self) -> &str;
}

/// Request body for the /generate endpoint.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    route_hint: Option<&'a str>,
}

/// Response from the /generate endpoint.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    answer: String,
}

/// HTTP client for a generation server.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_prompt(query: &str, context: &str) -> String {
        format!(
            "Based on the following context, answer the question:\n\n\
             Context:\n{context}\n\n\
             Question: {query}\n\n\
             Answer based only on the provided context. If the context doesn't \
             contain enough information, say so."
        )
    }
}

#[async_trait]
impl AnswerGenerator for HttpGenerator {
    async fn generate(
        &self,
        query: &str,
        context: &str,
        route_hint: Option<&str>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/generate", self.base_url);
        let request = GenerateRequest {
            prompt: Self::build_prompt(query, context),
            route_hint,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(generate_response.answer)
    }

    fn identifier(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimming() {
        let config = GeneratorConfig {
            url: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let generator = HttpGenerator::new(&config).unwrap();
        assert_eq!(generator.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_prompt_embeds_query_and_context() {
        let prompt = HttpGenerator::build_prompt("what is kbrag?", "Source: readme\nkbrag is...");
        assert!(prompt.contains("Question: what is kbrag?"));
        assert!(prompt.contains("Source: readme"));
        assert!(prompt.contains("only on the provided context"));
    }
}
