pub mod aggregate;
pub mod decoders;
pub mod extract;
pub mod gmail_client;

use anyhow::Result;

use crate::domain::email::{Message, MessageStub};

/// Read-only access to a remote mailbox.
pub trait Mailbox {
    /// Authenticate up front. Errors here are fatal for the caller, unlike
    /// per-request failures.
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Up to `max_results` messages matching `query`. No match is an empty list.
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageStub>>;

    fn get_message(&self, id: &str) -> Result<Message>;

    /// Decoded attachment bytes, or `None` when they could not be retrieved.
    /// Failures are logged by the implementation, never returned.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Option<Vec<u8>>;
}
