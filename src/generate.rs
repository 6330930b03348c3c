//! Generation collaborator for the assistant bridge
//!
//! [`Generator`] is the seam the sync core calls through; its only
//! contract is prompt in, structured text plus an optional file-tree
//! fragment out. [`GeminiGenerator`] is the production implementation,
//! calling the Gemini `generateContent` REST API with a system
//! instruction that constrains replies to `{"text", "fileTree"?}` JSON.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;
use crate::store::FileTree;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const SYSTEM_INSTRUCTION: &str = r#"You are an expert full-stack developer with over 10 years of experience. You write modular, maintainable code with clear comments, never overlook edge cases, and handle errors in every part of your development process.

Reply with a single JSON object. Always include a "text" field with your answer. When the user asks for code or files, also include a "fileTree" field mapping file paths to objects with a "contents" string, for example:

{"text": "here is your express server", "fileTree": {"app.js": {"contents": "const express = require('express')\n"}}}

For a plain conversational reply, return only the "text" field."#;

/// Structured output of one generation call.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    #[serde(rename = "fileTree", default)]
    pub file_tree: Option<FileTree>,
}

/// The generation model behind the assistant.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, GenerateError>;
}

/// Gemini-backed [`Generator`].
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn send_request(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            BASE_URL,
            model = self.model,
            api_key = self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: Some(Content {
                role: "system",
                parts: vec![Part {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| GenerateError::Request(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| GenerateError::Unparseable(format!("bad response body: {err}")))?;

        extract_text(parsed)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, GenerateError> {
        let text = self.send_request(prompt).await?;
        parse_output(&text)
    }
}

/// Parse a model reply into [`GenerationOutput`].
///
/// Models sometimes wrap JSON in a markdown fence even when asked not to,
/// so a leading ```json fence is stripped before parsing.
pub fn parse_output(raw: &str) -> Result<GenerationOutput, GenerateError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim())
        .map_err(|err| GenerateError::Unparseable(format!("{err}: {raw}")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, GenerateError> {
    response
        .candidates
        .and_then(|mut candidates| candidates.pop())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .ok_or_else(|| {
            GenerateError::Unparseable("no text in the response candidates".to_string())
        })
}

fn map_http_error(status: StatusCode, body: String) -> GenerateError {
    #[derive(Deserialize)]
    struct ErrorWrapper {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .ok()
        .and_then(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    GenerateError::Request(format!("{status}: {message}"))
}
