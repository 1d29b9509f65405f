//! Inbound webhook events
//!
//! Events arrive as a signed JSON batch. Each kind carries only the fields
//! meaningful to it; anything the bot does not understand becomes
//! [`EventKind::Unknown`] instead of failing the whole batch.

use super::PlatformError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Webhook request body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    /// Events in delivery order
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A single inbound event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Single-use token for replying, absent for some event kinds
    #[serde(default)]
    pub reply_token: Option<String>,
    /// Where the event came from
    pub source: Source,
    /// Kind-specific payload
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event origin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// One-to-one chat with a user
    User {
        /// Platform user id
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Group chat
    Group {
        /// Group id
        #[serde(rename = "groupId")]
        group_id: String,
        /// Sender, when the platform discloses it
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    /// Multi-person room
    Room {
        /// Room id
        #[serde(rename = "roomId")]
        room_id: String,
        /// Sender, when the platform discloses it
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
}

impl Source {
    /// Sender id, whatever the context.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id } => Some(user_id.as_str()),
            Self::Group { user_id, .. } | Self::Room { user_id, .. } => user_id.as_deref(),
        }
    }

    /// Sender id only when the event comes from a one-to-one chat.
    #[must_use]
    pub fn individual_user(&self) -> Option<&str> {
        match self {
            Self::User { user_id } => Some(user_id.as_str()),
            Self::Group { .. } | Self::Room { .. } => None,
        }
    }
}

/// Kind-specific event payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    /// The user added the bot
    Follow,
    /// The user sent a message
    Message {
        /// Message content
        message: MessageContent,
    },
    /// The user tapped a postback button
    Postback {
        /// Button data
        postback: Postback,
    },
    /// Any other event type
    #[serde(other)]
    Unknown,
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text
    Text {
        /// Message id
        id: String,
        /// Text body
        text: String,
    },
    /// Photo; content must be fetched separately
    Image {
        /// Message id
        id: String,
    },
    /// Stickers, video, audio, location...
    #[serde(other)]
    Other,
}

/// Postback payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Postback {
    /// Data string attached to the tapped button
    pub data: String,
}

/// Check `signature` (base64 HMAC-SHA256 of `body`) against the channel secret.
#[must_use]
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Verify and parse a webhook request.
///
/// # Errors
///
/// Returns `PlatformError::InvalidSignature` when the signature is missing or
/// wrong and `PlatformError::Json` when the body is not a valid event batch.
pub fn parse_request(
    channel_secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<Vec<Event>, PlatformError> {
    let signature = signature.ok_or(PlatformError::InvalidSignature)?;
    if !verify_signature(channel_secret, body, signature) {
        return Err(PlatformError::InvalidSignature);
    }
    let body: WebhookBody =
        serde_json::from_slice(body).map_err(|e| PlatformError::Json(e.to_string()))?;
    Ok(body.events)
}

/// Sign a body the way the platform does.
#[cfg(test)]
pub(crate) fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}
