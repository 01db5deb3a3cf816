//! ============================================================================
//! Membership Backend - Identity, billing and policy endpoints
//! ============================================================================
//! The store only talks to the outside world through [`MembershipBackend`].
//! [`HttpBackend`] is the JSON-over-HTTP implementation:
//! - GET  /api/auth/me               current user, 401 = no session
//! - GET  /api/beta/status           global beta window
//! - GET  /api/config/access         bypass policy
//! - POST /api/auth/discord/recheck  re-run Discord verification
//! - POST /api/auth/logout           end the session
//! ============================================================================

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::types::{BetaStatus, BypassConfig, GateError, User};

const USER_PATH: &str = "/api/auth/me";
const BETA_STATUS_PATH: &str = "/api/beta/status";
const ACCESS_CONFIG_PATH: &str = "/api/config/access";
const DISCORD_RECHECK_PATH: &str = "/api/auth/discord/recheck";
const LOGOUT_PATH: &str = "/api/auth/logout";

/// Source of the three access signals plus the session write actions
#[async_trait]
pub trait MembershipBackend: Send + Sync {
    /// Current user, or `None` when there is no session
    async fn fetch_user(&self) -> Result<Option<User>, GateError>;

    async fn fetch_beta_status(&self) -> Result<BetaStatus, GateError>;

    async fn fetch_bypass_config(&self) -> Result<BypassConfig, GateError>;

    /// Ask the backend to re-verify the linked Discord account
    async fn recheck_discord(&self) -> Result<(), GateError>;

    async fn logout(&self) -> Result<(), GateError>;
}

/// Membership backend over the JSON HTTP API
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &GateConfig) -> Result<Self, GateError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GateError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, GateError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GateError::Network(format!("{}: {}", path, e)))?;

        let status = response.status();
        debug!("{} -> {}", path, status);

        if status == StatusCode::UNAUTHORIZED {
            return Err(GateError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GateError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GateError> {
        let response = self.send(self.request(reqwest::Method::GET, path), path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GateError::Decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl MembershipBackend for HttpBackend {
    async fn fetch_user(&self) -> Result<Option<User>, GateError> {
        match self.get_json::<User>(USER_PATH).await {
            Ok(user) => Ok(Some(user)),
            Err(GateError::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_beta_status(&self) -> Result<BetaStatus, GateError> {
        self.get_json(BETA_STATUS_PATH).await
    }

    async fn fetch_bypass_config(&self) -> Result<BypassConfig, GateError> {
        self.get_json(ACCESS_CONFIG_PATH).await
    }

    async fn recheck_discord(&self) -> Result<(), GateError> {
        info!("Requesting Discord re-verification");

        let builder = self.request(reqwest::Method::POST, DISCORD_RECHECK_PATH);
        match self.send(builder, DISCORD_RECHECK_PATH).await {
            Ok(_) => Ok(()),
            Err(GateError::Unauthenticated) => Err(GateError::DiscordRecheck(
                "Your session has expired. Log in again to verify Discord.".to_string(),
            )),
            Err(GateError::Api { status, body }) => Err(GateError::DiscordRecheck(
                error_message(&body).unwrap_or_else(|| format!("server returned {}", status)),
            )),
            Err(e) => Err(GateError::DiscordRecheck(e.to_string())),
        }
    }

    async fn logout(&self) -> Result<(), GateError> {
        let builder = self.request(reqwest::Method::POST, LOGOUT_PATH);
        match self.send(builder, LOGOUT_PATH).await {
            Ok(_) | Err(GateError::Unauthenticated) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Pull a human-readable message out of an `{ "error" | "message" }` body
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty())
}
