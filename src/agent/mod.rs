pub mod conversation;
pub mod gemini;
pub mod graph;
pub mod tools;

use anyhow::Result;

use crate::agent::conversation::Message;
use crate::agent::tools::ToolDefinition;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant and you will be given subject keywords - \
you are tasked with reading all emails with given subject and suggesting a response to the last \
email in the newest thread about given subject.";

/// A chat model with function calling.
pub trait ChatModel {
    /// One assistant turn (a `Message::Assistant`) for the given history.
    fn invoke(&self, system: &str, history: &[Message], tools: &[ToolDefinition]) -> Result<Message>;
}
