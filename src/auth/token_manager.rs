use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::auth::oauth::{AuthorizationFlow, GoogleOAuth, Tokens};
use crate::auth::token_store::{StoredToken, TokenStore};
use crate::auth::{Credential, CredentialSource};

/// Assumed lifetime when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3500;

/// Credential Store: cached token, then refresh, then interactive consent.
pub struct TokenManager<F: AuthorizationFlow = GoogleOAuth> {
    store: TokenStore,
    flow: F,
}

fn now_epoch() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

impl<F: AuthorizationFlow> TokenManager<F> {
    pub fn new(store: TokenStore, flow: F) -> Self {
        Self { store, flow }
    }

    fn stored_token(&self) -> Option<StoredToken> {
        match self.store.load() {
            Ok(t) => t,
            Err(e) => {
                warn!("ignoring unreadable token file: {e:#}");
                None
            }
        }
    }

    fn persist(&self, tokens: Tokens, previous_refresh: Option<String>, now: i64) -> StoredToken {
        let stored = StoredToken {
            access_token: Some(tokens.access_token),
            // providers usually keep the old refresh token valid without resending it
            refresh_token: tokens.refresh_token.or(previous_refresh),
            expires_at_epoch: Some(
                tokens
                    .expires_in
                    .map(|s| now + s as i64)
                    .unwrap_or(now + DEFAULT_LIFETIME_SECS),
            ),
        };

        if let Err(e) = self.store.save(&stored) {
            warn!("couldn't save token to {}: {e:#}", self.store.path().display());
        }
        stored
    }

    /// Returns a valid token, refreshing or re-authorizing as needed.
    pub fn get_token(&self) -> Result<StoredToken> {
        let now = now_epoch()?;
        let cached = self.stored_token();

        // 1) cached & not expired
        if let Some(token) = &cached
            && token.is_valid(now)
        {
            return Ok(token.clone());
        }

        // 2) refresh if possible
        let refresh_token = cached.and_then(|t| t.refresh_token);
        if let Some(rt) = &refresh_token {
            info!("access token expired; refreshing");
            match self.flow.refresh(rt) {
                Ok(tokens) => return Ok(self.persist(tokens, refresh_token.clone(), now)),
                Err(e) => warn!("token refresh failed: {e:#}; re-authenticating"),
            }
        }

        // 3) otherwise interactive consent
        info!("running interactive authorization");
        let tokens = self
            .flow
            .authorize()
            .context("authorization failed; cannot access the mailbox")?;
        Ok(self.persist(tokens, refresh_token, now))
    }
}

impl<F: AuthorizationFlow> CredentialSource for TokenManager<F> {
    fn obtain_credentials(&self) -> Result<Credential> {
        let token = self.get_token()?;
        let access_token = token
            .access_token
            .ok_or_else(|| anyhow!("token store returned no access token"))?;
        Ok(Credential { access_token })
    }
}
