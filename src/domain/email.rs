use serde::Deserialize;

pub type MessageId = String;

/// Search hit: only the identifier is needed to fetch the full message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStub {
    pub id: MessageId,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub payload: PayloadNode,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One MIME part. The top-level payload carries the message headers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNode {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    /// `None` when the wire format has no `parts` key at all.
    #[serde(default)]
    pub parts: Option<Vec<PayloadNode>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// base64url, usually unpadded
    #[serde(default)]
    pub data: Option<String>,
}

impl PayloadNode {
    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("")
    }

    pub fn filename(&self) -> &str {
        self.filename.as_deref().unwrap_or("")
    }

    pub fn inline_data(&self) -> Option<&str> {
        self.body.data.as_deref().filter(|d| !d.is_empty())
    }

    pub fn attachment_id(&self) -> Option<&str> {
        self.body.attachment_id.as_deref().filter(|a| !a.is_empty())
    }

    pub fn children(&self) -> &[PayloadNode] {
        self.parts.as_deref().unwrap_or(&[])
    }
}

/// Readable content of one attachment, ready to be rendered as a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub filename: String,
    pub mime_type: String,
    pub content: String,
}

impl AttachmentSummary {
    pub fn to_block(&self) -> String {
        format!(
            "Attachment: {} ({})\n{}\n",
            self.filename, self.mime_type, self.content
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub attachments: Vec<AttachmentSummary>,
}
