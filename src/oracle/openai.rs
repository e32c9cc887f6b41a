use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{DecisionRequest, Oracle};
use crate::config::OracleConfig;
use crate::{Error, Result};

/// Oracle backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsOracle {
    http: Client,
    config: OracleConfig,
    api_key: String,
}

impl ChatCompletionsOracle {
    /// Build from config, reading the key from `config.api_key_env`.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::Config(format!("{} is not set", config.api_key_env)))?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &OracleConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            config: config.clone(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &DecisionRequest) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", request.image_base64) }
                    }
                ]
            }]
        })
    }
}

#[async_trait(?Send)]
impl Oracle for ChatCompletionsOracle {
    async fn decide(&mut self, request: &DecisionRequest) -> Result<String> {
        let url = self.endpoint();
        debug!("POST {} (model {})", url, self.config.model);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(request))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        read_completion(status, &body)
    }
}

/// Longest slice of an error body kept in the message.
const ERROR_BODY_CHARS: usize = 200;

/// Message content of a completion, or an [`Error::Oracle`] carrying the
/// HTTP status when the endpoint refused. Error bodies need not be JSON.
fn read_completion(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| {
                let body = body.trim();
                match body.char_indices().nth(ERROR_BODY_CHARS) {
                    Some((i, _)) => format!("{}...", &body[..i]),
                    None => body.to_string(),
                }
            });
        return Err(Error::Oracle(format!("{}: {}", status, message)));
    }
    content_of(&serde_json::from_str(body)?)
}

/// `choices[0].message.content` of a completion response.
fn content_of(resp: &Value) -> Result<String> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Oracle(format!("response has no message content: {}", resp)))
}
