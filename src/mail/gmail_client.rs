use std::cell::OnceCell;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;

use crate::auth::CredentialSource;
use crate::domain::email::{Message, MessageStub};
use crate::mail::Mailbox;
use crate::mail::decoders::decode_base64url;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Option<Vec<MessageStub>>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    data: Option<String>,
}

/// Ids are interpolated into the request path.
fn check_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains("..") {
        return Err(anyhow!("invalid {kind} id: {id:?}"));
    }
    Ok(())
}

/// Authenticated HTTP session, built once per client.
pub struct Session {
    http: Client,
    access_token: String,
}

pub struct GmailClient<C: CredentialSource> {
    credentials: C,
    base_url: String,
    session: OnceCell<Session>,
}

impl<C: CredentialSource> GmailClient<C> {
    pub fn new(credentials: C) -> Self {
        Self::with_base_url(credentials, GMAIL_API_BASE)
    }

    pub fn with_base_url(credentials: C, base_url: &str) -> Self {
        Self {
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: OnceCell::new(),
        }
    }

    /// Lazily authenticate; later calls reuse the same session.
    pub fn session(&self) -> Result<&Session> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }

        let credential = self.credentials.obtain_credentials()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build http client")?;

        debug!("mailbox session established");
        Ok(self.session.get_or_init(|| Session {
            http,
            access_token: credential.access_token,
        }))
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let session = self.session()?;
        let url = format!("{}{}", self.base_url, path);

        let resp = session
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .query(query)
            .send()
            .with_context(|| format!("request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("Gmail API error ({status}) for {path}: {body}"));
        }
        Ok(resp)
    }

    fn try_get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        check_id("message", message_id)?;
        check_id("attachment", attachment_id)?;
        let path = format!("/messages/{message_id}/attachments/{attachment_id}");
        let attachment: AttachmentResponse = self.get(&path, &[])?.json()?;
        match attachment.data {
            Some(data) => decode_base64url(&data),
            None => Ok(Vec::new()),
        }
    }
}

impl<C: CredentialSource> Mailbox for GmailClient<C> {
    fn connect(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageStub>> {
        let list: ListResponse = self
            .get(
                "/messages",
                &[
                    ("q", query.to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )?
            .json()
            .context("malformed message list")?;

        Ok(list.messages.unwrap_or_default())
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        check_id("message", id)?;
        self.get(&format!("/messages/{id}"), &[("format", "full".to_string())])?
            .json()
            .with_context(|| format!("malformed message {id}"))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Option<Vec<u8>> {
        match self.try_get_attachment(message_id, attachment_id) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("could not fetch attachment {attachment_id} of message {message_id}: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::mail::aggregate::Aggregator;
    use std::cell::Cell;

    struct CountingCredentials {
        calls: Cell<u32>,
    }

    impl CredentialSource for CountingCredentials {
        fn obtain_credentials(&self) -> Result<Credential> {
            self.calls.set(self.calls.get() + 1);
            Ok(Credential {
                access_token: "ya29.test".to_string(),
            })
        }
    }

    struct FailingCredentials;

    impl CredentialSource for FailingCredentials {
        fn obtain_credentials(&self) -> Result<Credential> {
            Err(anyhow!("authorization failed"))
        }
    }

    #[test]
    fn session_is_memoized() {
        let client = GmailClient::new(CountingCredentials { calls: Cell::new(0) });

        let first = client.session().unwrap() as *const Session;
        let second = client.session().unwrap() as *const Session;

        assert_eq!(first, second);
        assert_eq!(client.credentials.calls.get(), 1);
        assert_eq!(client.session().unwrap().access_token, "ya29.test");
    }

    #[test]
    fn authorization_failure_propagates() {
        let client = GmailClient::new(FailingCredentials);
        let err = client.search("\"x\"", 5).unwrap_err();
        assert!(err.to_string().contains("authorization failed"));
    }

    #[test]
    fn authorization_failure_stops_aggregation() {
        let client = GmailClient::new(FailingCredentials);
        let err = Aggregator::new(&client).aggregate("projectX", 5).unwrap_err();
        assert!(err.to_string().contains("authorization failed"));
    }

    #[test]
    fn connect_reuses_the_session() {
        let client = GmailClient::new(CountingCredentials { calls: Cell::new(0) });
        client.connect().unwrap();
        client.connect().unwrap();
        assert_eq!(client.credentials.calls.get(), 1);
    }

    #[test]
    fn attachment_failure_is_absent() {
        let client = GmailClient::new(FailingCredentials);
        assert!(client.get_attachment("m1", "a1").is_none());
    }

    #[test]
    fn rejects_path_like_message_ids() {
        let client = GmailClient::new(CountingCredentials { calls: Cell::new(0) });
        assert!(client.get_message("../labels").is_err());
        assert_eq!(client.credentials.calls.get(), 0);
    }

    #[test]
    fn rejects_path_like_attachment_ids() {
        let client = GmailClient::new(CountingCredentials { calls: Cell::new(0) });
        assert!(client.get_attachment("m1", "../../messages/m2").is_none());
        assert!(client.get_attachment("m1", "").is_none());
        assert_eq!(client.credentials.calls.get(), 0);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GmailClient::with_base_url(FailingCredentials, "http://localhost:9/v1/");
        assert_eq!(client.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn list_response_without_messages_is_empty() {
        let list: ListResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.unwrap_or_default().is_empty());
    }
}
