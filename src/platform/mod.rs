//! Messaging platform client
//!
//! Webhook parsing lives in [`events`], reply payloads in [`messages`].
//! [`LineClient`] talks to the platform's HTTP API.

pub mod events;
pub mod messages;

use crate::config::{PLATFORM_API_BASE, PLATFORM_DATA_API_BASE};
use crate::utils::{create_http_client, retry_platform_operation};
use async_trait::async_trait;
use messages::{CarouselTemplate, OutgoingMessage, Template};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the messaging platform
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Signature header missing or wrong
    #[error("Invalid webhook signature")]
    InvalidSignature,
    /// Body or response is not the expected JSON
    #[error("JSON error: {0}")]
    Json(String),
    /// Request never completed
    #[error("Network error: {0}")]
    Network(String),
    /// Non-success response
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },
}

impl PlatformError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidSignature | Self::Json(_) => false,
        }
    }
}

/// User display profile
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Platform user id
    pub user_id: String,
    /// Name shown in chats
    pub display_name: String,
}

/// Operations the bot performs against the messaging platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// Reply with a plain text message
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), PlatformError>;
    /// Reply with a carousel template
    async fn reply_template(
        &self,
        reply_token: &str,
        alt_text: &str,
        carousel: CarouselTemplate,
    ) -> Result<(), PlatformError>;
    /// Fetch a user's display profile
    async fn get_profile(&self, user_id: &str) -> Result<Profile, PlatformError>;
    /// Download the binary content of a message (photos)
    async fn get_message_content(&self, message_id: &str) -> Result<Vec<u8>, PlatformError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [OutgoingMessage],
}

/// HTTP client for the messaging platform API
#[derive(Debug, Clone)]
pub struct LineClient {
    http: HttpClient,
    channel_token: String,
    api_base: String,
    data_api_base: String,
}

impl LineClient {
    /// Create a client for the production API.
    #[must_use]
    pub fn new(channel_token: &str) -> Self {
        Self::with_endpoints(channel_token, PLATFORM_API_BASE, PLATFORM_DATA_API_BASE)
    }

    /// Create a client against custom endpoints.
    #[must_use]
    pub fn with_endpoints(channel_token: &str, api_base: &str, data_api_base: &str) -> Self {
        Self {
            http: create_http_client(),
            channel_token: channel_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            data_api_base: data_api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn checked(
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn reply(
        &self,
        reply_token: &str,
        messages: &[OutgoingMessage],
    ) -> Result<(), PlatformError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        retry_platform_operation(
            || {
                let request = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.channel_token)
                    .json(&ReplyRequest {
                        reply_token,
                        messages,
                    });
                Self::checked(request)
            },
            PlatformError::is_transient,
        )
        .await?;
        debug!("Replied with {} message(s)", messages.len());
        Ok(())
    }
}

#[async_trait]
impl MessagingPlatform for LineClient {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), PlatformError> {
        self.reply(reply_token, &[OutgoingMessage::text(text)]).await
    }

    async fn reply_template(
        &self,
        reply_token: &str,
        alt_text: &str,
        carousel: CarouselTemplate,
    ) -> Result<(), PlatformError> {
        let message = OutgoingMessage::Template {
            alt_text: alt_text.to_string(),
            template: Template::Carousel(carousel),
        };
        self.reply(reply_token, &[message]).await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Profile, PlatformError> {
        let url = format!("{}/v2/bot/profile/{user_id}", self.api_base);
        let response = Self::checked(self.http.get(url).bearer_auth(&self.channel_token)).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Json(e.to_string()))
    }

    async fn get_message_content(&self, message_id: &str) -> Result<Vec<u8>, PlatformError> {
        let url = format!("{}/v2/bot/message/{message_id}/content", self.data_api_base);
        let response = Self::checked(self.http.get(url).bearer_auth(&self.channel_token)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(PlatformError::Network("reset".to_string()).is_transient());
        assert!(PlatformError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(PlatformError::Api {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(!PlatformError::Api {
            status: 400,
            message: "Invalid reply token".to_string()
        }
        .is_transient());
        assert!(!PlatformError::InvalidSignature.is_transient());
    }

    #[test]
    fn test_profile_deserialize() -> Result<(), serde_json::Error> {
        let profile: Profile = serde_json::from_str(
            r#"{"userId":"U1","displayName":"Alice","pictureUrl":"https://p","language":"ja"}"#,
        )?;
        assert_eq!(profile.display_name, "Alice");
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_api_is_network_error() {
        let client = LineClient::with_endpoints("t", "http://127.0.0.1:9", "http://127.0.0.1:9");
        assert!(matches!(
            client.get_profile("U1").await,
            Err(PlatformError::Network(_))
        ));
    }
}
