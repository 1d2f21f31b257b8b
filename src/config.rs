use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Optional `config.toml`; every key may be overridden from the environment.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub google_api_key: Option<String>,
    pub credentials_path: Option<String>,
    pub token_path: Option<String>,
    pub log_level: Option<String>,
    pub model: Option<String>,
    pub max_steps: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub log_level: String,
    pub model: String,
    pub max_steps: usize,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("rs_mail_reply"))
}

/// `$RS_MAIL_REPLY_CONFIG`, else `<config dir>/rs_mail_reply/config.toml`.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("RS_MAIL_REPLY_CONFIG") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

pub fn load_file_config() -> Result<FileConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let s = fs::read_to_string(&path)?;
    toml::from_str(&s).with_context(|| format!("invalid config file {}", path.display()))
}

impl Config {
    /// Layers defaults, the config file, then environment variables read
    /// through `env`.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_steps = match env("AGENT_MAX_STEPS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("AGENT_MAX_STEPS must be a positive integer, got {v:?}"))?,
            None => file.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
        };
        if max_steps == 0 {
            return Err(anyhow!("AGENT_MAX_STEPS must be at least 1"));
        }

        Ok(Self {
            google_api_key: env("GOOGLE_API_KEY")
                .or(file.google_api_key)
                .filter(|k| !k.trim().is_empty()),
            credentials_path: env("GMAIL_CREDENTIALS_PATH")
                .or(file.credentials_path)
                .unwrap_or_else(|| "credentials.json".to_string())
                .into(),
            token_path: env("GMAIL_TOKEN_PATH")
                .or(file.token_path)
                .unwrap_or_else(|| "token.json".to_string())
                .into(),
            log_level: env("LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            model: env("GEMINI_MODEL")
                .or(file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_steps,
        })
    }

    /// Reads `.env` (if any), the config file and the process environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let file = load_file_config()?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.google_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GOOGLE_API_KEY environment variable is not set"))
    }
}
