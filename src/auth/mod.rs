pub mod client_secrets;
pub mod oauth;
pub mod token_manager;
pub mod token_store;

use anyhow::Result;

/// Read-only mailbox scope; nothing here ever writes to the mailbox.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Bearer credential for the mailbox API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
}

pub trait CredentialSource {
    /// A valid, non-expired credential. Errors are fatal for the caller.
    fn obtain_credentials(&self) -> Result<Credential>;
}
