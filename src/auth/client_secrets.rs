use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// OAuth application credentials as downloaded from the Google console.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(s: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(s).context("malformed client secrets file")?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow!("client secrets file has neither an \"installed\" nor a \"web\" section"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("cannot read client secrets at {}", path.display()))?;
        Self::from_json(&s)
    }
}
