use anyhow::{Result, anyhow};
use log::debug;

use crate::agent::conversation::{Conversation, Message};
use crate::agent::tools::{Tool, ToolBox};
use crate::agent::{ChatModel, SYSTEM_PROMPT};
use crate::config::DEFAULT_MAX_STEPS;
use crate::mail::Mailbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Assistant,
    Tools,
}

/// Edge out of the assistant node: tools if any were requested, else done.
pub fn route_after_assistant(last: &Message) -> Option<Node> {
    if last.tool_calls().is_empty() {
        None
    } else {
        Some(Node::Tools)
    }
}

#[derive(Debug)]
pub struct AgentRun {
    pub reply: String,
    pub conversation: Conversation,
}

pub struct Agent<'a, L: ChatModel + ?Sized, M: Mailbox + ?Sized> {
    model: &'a L,
    tools: ToolBox<'a, M>,
    system_prompt: String,
    max_steps: usize,
}

impl<'a, L: ChatModel + ?Sized, M: Mailbox + ?Sized> Agent<'a, L, M> {
    pub fn new(model: &'a L, mailbox: &'a M) -> Self {
        Self {
            model,
            tools: ToolBox::new(mailbox),
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn run(&self, user_input: &str) -> Result<AgentRun> {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(user_input));
        self.resume(conversation)
    }

    /// Continue from an existing history, starting at the assistant node.
    pub fn resume(&self, mut conversation: Conversation) -> Result<AgentRun> {
        let definitions = Tool::definitions();
        let mut node = Node::Assistant;

        for step in 0..self.max_steps {
            debug!("step {step}: {node:?}");
            node = match node {
                Node::Assistant => {
                    let reply =
                        self.model
                            .invoke(&self.system_prompt, conversation.messages(), &definitions)?;
                    let next = route_after_assistant(&reply);
                    conversation.push(reply);
                    match next {
                        Some(next) => next,
                        None => {
                            let reply = conversation
                                .last()
                                .map(|m| m.content().to_string())
                                .unwrap_or_default();
                            return Ok(AgentRun {
                                reply,
                                conversation,
                            });
                        }
                    }
                }
                Node::Tools => {
                    let calls = conversation
                        .last()
                        .map(|m| m.tool_calls().to_vec())
                        .unwrap_or_default();
                    for call in &calls {
                        let output = self.tools.execute(call)?;
                        conversation.push(Message::tool_result(call, output));
                    }
                    Node::Assistant
                }
            };
        }

        Err(anyhow!(
            "agent stopped after {} steps without a final answer",
            self.max_steps
        ))
    }
}
