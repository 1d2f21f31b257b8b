use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use log::info;

use rs_mail_reply::agent::gemini::GeminiClient;
use rs_mail_reply::agent::graph::Agent;
use rs_mail_reply::auth::client_secrets::ClientSecrets;
use rs_mail_reply::auth::oauth::GoogleOAuth;
use rs_mail_reply::auth::token_manager::TokenManager;
use rs_mail_reply::auth::token_store::TokenStore;
use rs_mail_reply::auth::{CredentialSource, GMAIL_READONLY_SCOPE};
use rs_mail_reply::config::Config;
use rs_mail_reply::mail::aggregate::{Aggregator, DEFAULT_MAX_RESULTS};
use rs_mail_reply::mail::gmail_client::GmailClient;

#[derive(Parser)]
#[command(name = "rs_mail_reply")]
#[command(about = "Suggest a reply to the newest email thread about a subject", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the emails with this subject and suggest a reply
    Suggest {
        #[arg(required = true)]
        subject_keywords: Vec<String>,
    },

    /// Print the collected email text for a subject (no model involved)
    Fetch {
        #[arg(required = true)]
        subject_keywords: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: u32,
    },

    /// Authorize mailbox access and store the token
    Auth,
}

fn token_manager(cfg: &Config) -> Result<TokenManager> {
    let secrets = ClientSecrets::load(&cfg.credentials_path).with_context(|| {
        format!(
            "cannot read application credentials from {}",
            cfg.credentials_path.display()
        )
    })?;
    let flow = GoogleOAuth::new(secrets, GMAIL_READONLY_SCOPE);
    Ok(TokenManager::new(TokenStore::new(&cfg.token_path), flow))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load().map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cfg.log_level)).init();

    match cli.cmd {
        Command::Auth => {
            let manager = token_manager(&cfg)?;
            manager.obtain_credentials()?;
            println!("Saved token to {}", cfg.token_path.display());
            Ok(())
        }

        Command::Fetch {
            subject_keywords,
            max_results,
        } => {
            let gmail = GmailClient::new(token_manager(&cfg)?);
            let text = Aggregator::new(&gmail).aggregate(&subject_keywords.join(" "), max_results)?;
            println!("{text}");
            Ok(())
        }

        Command::Suggest { subject_keywords } => {
            let api_key = cfg.require_api_key()?;
            let model = GeminiClient::new(api_key, cfg.model.as_str())?;
            let gmail = GmailClient::new(token_manager(&cfg)?);

            let keywords = subject_keywords.join(" ");
            info!("suggesting a reply for subject {keywords:?}");
            let run = Agent::new(&model, &gmail)
                .with_max_steps(cfg.max_steps)
                .run(&keywords)?;

            println!("{}", run.reply);
            Ok(())
        }
    }
}
