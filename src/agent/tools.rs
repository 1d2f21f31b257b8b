use anyhow::{Result, anyhow};
use log::info;
use serde::Serialize;
use serde_json::{Value, json};

use crate::agent::conversation::ToolCall;
use crate::mail::Mailbox;
use crate::mail::aggregate::{Aggregator, DEFAULT_MAX_RESULTS};

pub const GET_EMAILS_BY_SUBJECT: &str = "get_emails_by_subject";

/// Function declaration handed to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Every tool the model may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    GetEmailsBySubject {
        subject_keywords: String,
        max_results: u32,
    },
}

/// Integers sometimes arrive as JSON floats (`5.0`).
fn as_count(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .and_then(|n| u32::try_from(n).ok())
}

impl Tool {
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: GET_EMAILS_BY_SUBJECT.to_string(),
            description: "Get emails by subject keywords. Returns the subject, sender, body text \
                and readable attachment content of every matching email as one text block, \
                or an empty string when nothing matches."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "subject_keywords": {
                        "type": "string",
                        "description": "Phrase searched for as an exact match in the mailbox"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of emails to return (default: 10)"
                    }
                },
                "required": ["subject_keywords"]
            }),
        }]
    }

    pub fn from_call(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            GET_EMAILS_BY_SUBJECT => {
                let subject_keywords = call.arguments["subject_keywords"]
                    .as_str()
                    .ok_or_else(|| anyhow!("missing 'subject_keywords' parameter"))?
                    .to_string();
                let max_results = match &call.arguments["max_results"] {
                    Value::Null => DEFAULT_MAX_RESULTS,
                    v => as_count(v)
                        .ok_or_else(|| anyhow!("'max_results' must be a non-negative integer, got {v}"))?,
                };
                Ok(Tool::GetEmailsBySubject {
                    subject_keywords,
                    max_results,
                })
            }
            other => Err(anyhow!("unknown tool '{other}'")),
        }
    }
}

/// Executes model-requested tools against the mailbox.
pub struct ToolBox<'m, M: Mailbox + ?Sized> {
    aggregator: Aggregator<'m, M>,
}

impl<'m, M: Mailbox + ?Sized> ToolBox<'m, M> {
    pub fn new(mailbox: &'m M) -> Self {
        Self {
            aggregator: Aggregator::new(mailbox),
        }
    }

    pub fn run(&self, tool: &Tool) -> Result<String> {
        match tool {
            Tool::GetEmailsBySubject {
                subject_keywords,
                max_results,
            } => self.aggregator.aggregate(subject_keywords, *max_results),
        }
    }

    /// Tool output for the conversation; bad calls are reported as text.
    /// A mailbox that cannot be reached at all aborts the run.
    pub fn execute(&self, call: &ToolCall) -> Result<String> {
        match Tool::from_call(call) {
            Ok(tool) => {
                info!("running tool {} ({})", call.name, call.id);
                self.run(&tool)
            }
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_0".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn parses_arguments_with_default() {
        let tool = Tool::from_call(&call(GET_EMAILS_BY_SUBJECT, json!({"subject_keywords": "invoice"}))).unwrap();
        assert_eq!(
            tool,
            Tool::GetEmailsBySubject {
                subject_keywords: "invoice".into(),
                max_results: 10
            }
        );
    }

    #[test]
    fn accepts_float_counts() {
        let tool = Tool::from_call(&call(
            GET_EMAILS_BY_SUBJECT,
            json!({"subject_keywords": "x", "max_results": 5.0}),
        ))
        .unwrap();
        assert!(matches!(tool, Tool::GetEmailsBySubject { max_results: 5, .. }));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Tool::from_call(&call(GET_EMAILS_BY_SUBJECT, json!({}))).is_err());
        assert!(
            Tool::from_call(&call(GET_EMAILS_BY_SUBJECT, json!({"subject_keywords": "x", "max_results": -1}))).is_err()
        );
        assert!(
            Tool::from_call(&call(GET_EMAILS_BY_SUBJECT, json!({"subject_keywords": "x", "max_results": 2.5}))).is_err()
        );
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = Tool::from_call(&call("send_email", json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "unknown tool 'send_email'");
    }

    #[test]
    fn definition_matches_parser() {
        let defs = Tool::definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, GET_EMAILS_BY_SUBJECT);
        assert_eq!(defs[0].parameters["required"], json!(["subject_keywords"]));
    }
}
