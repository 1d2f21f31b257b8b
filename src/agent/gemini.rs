use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::agent::ChatModel;
use crate::agent::conversation::{Message, ToolCall};
use crate::agent::tools::ToolDefinition;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionDeclarations<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclarations<'a> {
    function_declarations: &'a [ToolDefinition],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

/// Gemini roles: "user" for people and tool results, "model" for the assistant.
/// Consecutive tool results are sent back as one turn.
fn to_contents(history: &[Message]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::with_capacity(history.len());

    for message in history {
        match message {
            Message::User { content } => contents.push(Content {
                role: Some("user".into()),
                parts: vec![text_part(content)],
            }),
            Message::Assistant { content, tool_calls } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(text_part(content));
                }
                parts.extend(tool_calls.iter().map(|call| Part {
                    function_call: Some(FunctionCall {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    ..Default::default()
                }));
                contents.push(Content {
                    role: Some("model".into()),
                    parts,
                });
            }
            Message::Tool { name, content, .. } => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: name.clone(),
                        response: json!({ "content": content }),
                    }),
                    ..Default::default()
                };
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part)
                    }
                    _ => contents.push(Content {
                        role: Some("user".into()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }
    contents
}

/// `turn` keeps call ids unique across the conversation.
fn from_response(resp: GenerateContentResponse, turn: usize) -> Result<Message> {
    let candidate = resp.candidates.into_iter().next().ok_or_else(|| {
        anyhow!(
            "model returned no candidates (prompt feedback: {})",
            resp.prompt_feedback.unwrap_or(Value::Null)
        )
    })?;
    debug!("model finished with {:?}", candidate.finish_reason);

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in candidate.content.unwrap_or_default().parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                id: format!("call_{turn}_{}", tool_calls.len()),
                name: call.name,
                arguments: call.args,
            });
        }
    }

    Ok(Message::Assistant {
        content: text,
        tool_calls,
    })
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl ChatModel for GeminiClient {
    fn invoke(&self, system: &str, history: &[Message], tools: &[ToolDefinition]) -> Result<Message> {
        let request = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![text_part(system)],
            },
            contents: to_contents(history),
            tools: if tools.is_empty() {
                vec![]
            } else {
                vec![FunctionDeclarations {
                    function_declarations: tools,
                }]
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .context("model request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("Gemini API error ({status}): {body}"));
        }

        let parsed: GenerateContentResponse = resp.json().context("malformed model response")?;
        from_response(parsed, history.len())
    }
}
