use anyhow::Result;
use log::{error, info};

use crate::domain::email::ExtractionResult;
use crate::mail::Mailbox;
use crate::mail::extract::{NO_CONTENT, extract, render_attachments};

pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Exact-phrase query for the mailbox search.
pub fn build_query(subject_keywords: &str) -> String {
    format!("\"{subject_keywords}\"")
}

pub fn format_email(email: &ExtractionResult) -> String {
    let body = if email.body.is_empty() {
        NO_CONTENT
    } else {
        email.body.as_str()
    };

    let mut out = format!(
        "Subject: {}\nFrom: {}\nMessage:\n{}",
        email.subject, email.sender, body
    );

    let attachments = render_attachments(&email.attachments);
    if !attachments.is_empty() {
        out.push_str("\n\n");
        out.push_str(&attachments);
    }
    out
}

/// Flattens every message matching a subject phrase into one text blob.
pub struct Aggregator<'m, M: Mailbox + ?Sized> {
    mailbox: &'m M,
}

impl<'m, M: Mailbox + ?Sized> Aggregator<'m, M> {
    pub fn new(mailbox: &'m M) -> Self {
        Self { mailbox }
    }

    /// Empty string when nothing matches or when any search/fetch fails.
    /// Only a failure to connect to the mailbox is returned as an error.
    pub fn aggregate(&self, subject_keywords: &str, max_results: u32) -> Result<String> {
        self.mailbox.connect()?;

        Ok(match self.try_aggregate(subject_keywords, max_results) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to collect emails for subject {subject_keywords:?}: {e:#}");
                String::new()
            }
        })
    }

    fn try_aggregate(&self, subject_keywords: &str, max_results: u32) -> Result<String> {
        let stubs = self
            .mailbox
            .search(&build_query(subject_keywords), max_results)?;

        if stubs.is_empty() {
            info!("no emails found for subject {subject_keywords:?}");
            return Ok(String::new());
        }
        info!("found {} emails for subject {subject_keywords:?}", stubs.len());

        let mut blocks = Vec::with_capacity(stubs.len());
        for stub in &stubs {
            let message = self.mailbox.get_message(&stub.id)?;
            blocks.push(format_email(&extract(self.mailbox, &message)));
        }

        Ok(format!("\n\n{}", blocks.join("\n\n")))
    }
}
