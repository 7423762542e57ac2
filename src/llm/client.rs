use crate::error::{PipelineError, Result};
use crate::llm::types::TextCompletion;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Reads `GEMINI_API_KEY` (required) and `GEMINI_MODEL` (optional).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| PipelineError::Validation("GEMINI_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.2 },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(PipelineError::Upstream(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        body.candidates
            .ok_or_else(|| PipelineError::Upstream("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Upstream("Empty candidates list".to_string()))?
            .content
            .parts
            .into_iter()
            .next()
            .map(|part| part.text)
            .ok_or_else(|| PipelineError::Upstream("No parts in content".to_string()))
    }
}

#[async_trait]
impl TextCompletion for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt).await
    }
}
