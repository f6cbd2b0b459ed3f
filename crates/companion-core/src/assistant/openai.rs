use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::AssistantError;
use crate::util::http;

use super::{AssistantApi, Run, RunStatus};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI Assistants API client (threads/runs, v2).
pub struct OpenAiAssistant {
    api_key: String,
    api_base: String,
}

impl OpenAiAssistant {
    pub fn new(api_key: String) -> Self {
        Self::with_base(api_key, DEFAULT_API_BASE.to_string())
    }

    pub fn with_base(api_key: String, api_base: String) -> Self {
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        http::client()
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, AssistantError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(response.json().await?)
    }

    /// Retrieve the assistant itself; used at startup to verify the
    /// configured assistant id actually exists.
    pub async fn get_assistant(
        &self,
        assistant_id: &str,
    ) -> Result<AssistantInfo, AssistantError> {
        let data = self
            .send(self.request(reqwest::Method::GET, &format!("/assistants/{assistant_id}")))
            .await?;
        Ok(AssistantInfo {
            id: field_str(&data, "id")?,
            name: data
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            model: data
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        })
    }
}

/// Assistant metadata returned by the startup verification call.
#[derive(Debug, Clone)]
pub struct AssistantInfo {
    pub id: String,
    pub name: String,
    pub model: String,
}

fn field_str(data: &serde_json::Value, field: &str) -> Result<String, AssistantError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AssistantError::Parse(format!("missing field: {field}")))
}

/// Parse a run object from the API.
fn parse_run(data: &serde_json::Value) -> Result<Run, AssistantError> {
    let id = field_str(data, "id")?;
    let status = data
        .get("status")
        .and_then(|v| v.as_str())
        .map(RunStatus::from)
        .ok_or_else(|| AssistantError::Parse("missing field: status".to_string()))?;
    let last_error = data
        .pointer("/last_error/message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Ok(Run {
        id,
        status,
        last_error,
    })
}

/// Extract the newest assistant-authored text from a message list response
/// (newest-first ordering).
fn extract_latest_assistant_text(data: &serde_json::Value) -> Option<String> {
    let messages = data.get("data")?.as_array()?;
    let latest = messages
        .iter()
        .find(|m| m.get("role").and_then(|v| v.as_str()) == Some("assistant"))?;
    let blocks = latest.get("content")?.as_array()?;
    let text = blocks
        .iter()
        .filter_map(|b| b.pointer("/text/value").and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let data = self
            .send(self.request(reqwest::Method::POST, "/threads").json(&json!({})))
            .await?;
        let id = field_str(&data, "id")?;
        debug!(thread_id = %id, "created assistant thread");
        Ok(id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/threads/{thread_id}/messages"),
            )
            .json(&json!({ "role": "user", "content": text })),
        )
        .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, AssistantError> {
        let data = self
            .send(
                self.request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        parse_run(&data)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let data = self
            .send(self.request(
                reqwest::Method::GET,
                &format!("/threads/{thread_id}/runs/{run_id}"),
            ))
            .await?;
        parse_run(&data)
    }

    async fn latest_assistant_text(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        let data = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/threads/{thread_id}/messages"),
                )
                .query(&[("order", "desc"), ("limit", "10")]),
            )
            .await?;
        Ok(extract_latest_assistant_text(&data))
    }
}
