use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use log::{info, warn};
use oauth2::TokenResponse;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    RefreshToken, Scope, TokenUrl,
};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::client_secrets::ClientSecrets;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens returned by the oauth flow (in-memory)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// The two ways of getting a fresh access token.
pub trait AuthorizationFlow {
    fn refresh(&self, refresh_token: &str) -> Result<Tokens>;

    /// Interactive consent in the user's browser.
    fn authorize(&self) -> Result<Tokens>;
}

/// Google OAuth: refresh-token exchange and Authorization Code + PKCE over a
/// loopback redirect.
pub struct GoogleOAuth {
    secrets: ClientSecrets,
    scope: String,
}

impl GoogleOAuth {
    pub fn new(secrets: ClientSecrets, scope: impl Into<String>) -> Self {
        Self {
            secrets,
            scope: scope.into(),
        }
    }

    fn client(&self) -> Result<BasicClient> {
        let client_id = ClientId::new(self.secrets.client_id.clone());
        let client_secret = self.secrets.client_secret.clone().map(ClientSecret::new);
        let auth_url = AuthUrl::new(self.secrets.auth_uri.clone())?;
        let token_url = TokenUrl::new(self.secrets.token_uri.clone())?;

        Ok(BasicClient::new(
            client_id,
            client_secret,
            auth_url,
            Some(token_url),
        ))
    }
}

fn into_tokens<T: TokenResponse<oauth2::basic::BasicTokenType>>(token: &T) -> Tokens {
    Tokens {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
        expires_in: token.expires_in().map(|d| d.as_secs()),
    }
}

/// Parameters Google appends to the loopback redirect.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `request_path` is a path+query like "/?code=...&state=..."
pub fn parse_callback(request_path: &str) -> Result<CallbackParams> {
    let full = Url::parse("http://127.0.0.1")?.join(request_path)?;
    let mut params = CallbackParams::default();
    for (k, v) in full.query_pairs() {
        match k.as_ref() {
            "code" => params.code = Some(v.into_owned()),
            "state" => params.state = Some(v.into_owned()),
            "error" => params.error = Some(v.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}

impl AuthorizationFlow for GoogleOAuth {
    fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        let rt = RefreshToken::new(refresh_token.to_string());
        let token = self
            .client()?
            .exchange_refresh_token(&rt)
            .request(http_client)?;

        Ok(into_tokens(&token))
    }

    fn authorize(&self) -> Result<Tokens> {
        // Start listening FIRST so the redirect cannot race the browser
        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let server = Server::http(bind_addr)
            .map_err(|e| anyhow!("Failed to bind OAuth callback server: {e}"))?;
        let port = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("OAuth callback server is not bound to an IP address"))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");

        let oauth_client = self
            .client()?
            .set_redirect_uri(RedirectUrl::new(redirect_uri)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = oauth_client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(self.scope.clone()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("Open this URL in your browser:\n{auth_url}");
        // best-effort: don't fail if browser can't be opened
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!("could not open browser automatically: {e}");
        }

        let mut code_opt: Option<String> = None;
        let wait_until = Instant::now() + CALLBACK_TIMEOUT;

        while Instant::now() < wait_until {
            let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(500)) else {
                continue;
            };
            let Some(request) = maybe_request else {
                continue;
            };

            let params = match parse_callback(request.url()) {
                Ok(p) => p,
                Err(_) => {
                    let _ = request.respond(Response::from_string("Bad redirect"));
                    continue;
                }
            };

            if let Some(err) = params.error {
                let _ = request.respond(Response::from_string(
                    "Authorization was denied. You can close this tab.",
                ));
                return Err(anyhow!("authorization denied: {err}"));
            }

            if params.state.as_deref() != Some(csrf_token.secret().as_str()) {
                let _ = request.respond(Response::from_string(
                    "State mismatch in redirect. You can close this tab.",
                ));
                continue;
            }

            if let Some(code) = params.code {
                let _ = request.respond(Response::from_string(
                    "Authorization received. You can close this tab.",
                ));
                code_opt = Some(code);
                break;
            }

            let _ = request.respond(Response::from_string(
                "No code found in redirect. You can close this tab.",
            ));
        }

        let code = code_opt.ok_or_else(|| anyhow!("No code received within timeout"))?;

        let token = oauth_client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request(http_client)
            .map_err(|e| anyhow!("Token exchange failed: {e:?}"))?;

        info!("authorization code exchanged for tokens");
        Ok(into_tokens(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_with_code_and_state() {
        let params = parse_callback("/?state=xyz&code=4%2F0Ab&scope=gmail.readonly").unwrap();
        assert_eq!(params.code.as_deref(), Some("4/0Ab"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.error, None);
    }

    #[test]
    fn callback_with_error() {
        let params = parse_callback("/?error=access_denied&state=xyz").unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.code, None);
    }

    #[test]
    fn callback_without_query() {
        assert_eq!(parse_callback("/favicon.ico").unwrap(), CallbackParams::default());
    }

    #[test]
    fn client_rejects_bad_endpoints() {
        let oauth = GoogleOAuth::new(
            ClientSecrets {
                client_id: "id".into(),
                client_secret: None,
                auth_uri: "not a url".into(),
                token_uri: "https://oauth2.googleapis.com/token".into(),
            },
            crate::auth::GMAIL_READONLY_SCOPE,
        );
        assert!(oauth.client().is_err());
    }
}
