//! Language model providers.
//!
//! | `llm.provider` | Endpoint |
//! |----------------|----------|
//! | `ollama` | `POST /api/generate` (non-streaming) |
//! | `openai` | `POST /v1/chat/completions` (`OPENAI_API_KEY`) |
//! | `bedrock` | `POST /model/{model}/invoke`, SigV4-signed |
//! | `disabled` | always fails |
//!
//! Calls are made once. Timeouts come from `llm.timeout_secs` and surface
//! as errors like any other failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use rag_query_core::generate::LanguageModel;

use crate::aws::{AwsCredentials, AwsEndpoint};
use crate::config::LlmConfig;

pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "bedrock" => Ok(Arc::new(BedrockModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn required_model(config: &LlmConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("llm.model required for provider '{}'", config.provider))
}

async fn read_json(response: reqwest::Response, label: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body);
    }
    Ok(response.json().await?)
}

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled; set [llm] provider in the config")
    }
}

// ============ Ollama ============

pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .as_deref()
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            model: required_model(config)?,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;
        let json = read_json(response, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}

// ============ OpenAI ============

pub struct OpenAIChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .as_deref()
                .unwrap_or("https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: required_model(config)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let json = read_json(response, "OpenAI").await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

// ============ Bedrock ============

/// Bedrock runtime `InvokeModel`.
///
/// The request and response shapes depend on the model family, chosen by
/// the model id prefix.
pub struct BedrockModel {
    client: reqwest::Client,
    endpoint: AwsEndpoint,
    creds: AwsCredentials,
    model: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl BedrockModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let region = config
            .region
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.region required for Bedrock provider"))?;
        Ok(Self {
            client: http_client(config)?,
            endpoint: AwsEndpoint::new("bedrock-runtime", "bedrock", &region, config.url.as_deref()),
            creds: AwsCredentials::from_env()?,
            model: required_model(config)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens.unwrap_or(1024),
        })
    }
}

/// Build the `InvokeModel` body for `model`.
fn bedrock_request(model: &str, prompt: &str, max_tokens: u32, temperature: Option<f32>) -> serde_json::Value {
    let mut body = if model.starts_with("mistral.") {
        serde_json::json!({
            "prompt": format!("<s>[INST] {} [/INST]", prompt),
            "max_tokens": max_tokens,
        })
    } else if model.starts_with("anthropic.") {
        serde_json::json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        })
    } else if model.starts_with("meta.") {
        serde_json::json!({
            "prompt": prompt,
            "max_gen_len": max_tokens,
        })
    } else if model.starts_with("amazon.titan") {
        serde_json::json!({
            "inputText": prompt,
            "textGenerationConfig": { "maxTokenCount": max_tokens },
        })
    } else {
        serde_json::json!({ "prompt": prompt, "max_tokens": max_tokens })
    };

    if let Some(t) = temperature {
        if model.starts_with("amazon.titan") {
            body["textGenerationConfig"]["temperature"] = serde_json::json!(t);
        } else {
            body["temperature"] = serde_json::json!(t);
        }
    }
    body
}

/// Pull the generated text out of any supported model family's response,
/// unmodified.
fn bedrock_response_text(json: &serde_json::Value) -> Result<String> {
    let candidates = [
        "/outputs/0/text",
        "/content/0/text",
        "/generation",
        "/results/0/outputText",
        "/completion",
    ];
    candidates
        .iter()
        .find_map(|p| json.pointer(p).and_then(|v| v.as_str()))
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Unrecognized Bedrock response shape"))
}

#[async_trait]
impl LanguageModel for BedrockModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = bedrock_request(&self.model, prompt, self.max_tokens, self.temperature);
        let response = self
            .endpoint
            .signed_post(
                &self.client,
                &self.creds,
                &["model", self.model.as_str(), "invoke"],
                serde_json::to_vec(&body)?,
                &[("accept", "application/json")],
            )
            .send()
            .await
            .with_context(|| format!("Bedrock InvokeModel request failed for '{}'", self.model))?;
        let json = read_json(response, "Bedrock").await?;
        bedrock_response_text(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mistral_request_shape() {
        let body = bedrock_request("mistral.mistral-7b-instruct-v0:2", "hi", 512, Some(0.2));
        assert_eq!(body["prompt"], "<s>[INST] hi [/INST]");
        assert_eq!(body["max_tokens"], 512);
        assert!(body["temperature"].is_number());
    }

    #[test]
    fn test_titan_temperature_nested() {
        let body = bedrock_request("amazon.titan-text-express-v1", "hi", 100, Some(0.5));
        assert_eq!(body["inputText"], "hi");
        assert!(body["textGenerationConfig"]["temperature"].is_number());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_response_text_shapes() {
        let mistral = serde_json::json!({"outputs": [{"text": " Answer. ", "stop_reason": "stop"}]});
        assert_eq!(bedrock_response_text(&mistral).unwrap(), " Answer. ");
        let claude = serde_json::json!({"content": [{"type": "text", "text": "A\n\nB\n"}]});
        assert_eq!(bedrock_response_text(&claude).unwrap(), "A\n\nB\n");
        let llama = serde_json::json!({"generation": "L"});
        assert_eq!(bedrock_response_text(&llama).unwrap(), "L");
        assert!(bedrock_response_text(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_model_fails() {
        let model = create_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.model_name(), "disabled");
        assert!(model.complete("p").await.is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(create_model(&config).is_err());
    }
}
