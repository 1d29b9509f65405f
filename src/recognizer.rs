//! Recognition service client
//!
//! Every client binds exactly one credential class. Admin clients only
//! register users and mint their tokens; user clients do everything else.

use crate::utils::create_http_client;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by the recognition service
#[derive(Error, Debug)]
pub enum RecognizerError {
    /// Credential rejected, or an admin-only call made with a user credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The inference was already accepted or rejected
    #[error("Inference {0} already resolved")]
    AlreadyResolved(u32),
    /// Service unreachable or failing
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Any other non-success response
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        message: String,
    },
    /// Response body did not match the expected shape
    #[error("JSON error: {0}")]
    Json(String),
}

/// A named identity inferences are grouped under
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Label {
    /// Label id
    pub id: u32,
    /// Display name
    pub name: String,
    /// Optional free-text description
    #[serde(default)]
    pub description: Option<String>,
}

/// Photo metadata attached to a face
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Photo {
    /// Free-text caption, may contain newlines
    #[serde(default)]
    pub caption: String,
    /// Where the photo was found
    pub source_url: String,
}

/// A detected face
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Face {
    /// Face id
    pub id: u32,
    /// Cropped face image
    pub image_url: String,
    /// Photo the face was detected in
    pub photo: Photo,
}

/// Raw inference record as returned by the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Inference {
    /// Inference id
    pub id: u32,
    /// Plausibility score, not necessarily within 0..1
    pub score: f64,
    /// Matched face
    pub face: Face,
    /// Candidate label
    pub label: Label,
}

/// Flattened candidate match shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceCandidate {
    /// Inference id
    pub inference_id: u32,
    /// Face id
    pub face_id: u32,
    /// Label id
    pub label_id: u32,
    /// Label name
    pub label_name: String,
    /// Label description
    pub label_description: Option<String>,
    /// Plausibility score
    pub score: f64,
    /// Photo caption
    pub photo_caption: String,
    /// Face image URL
    pub photo_image_url: String,
    /// Photo source page URL
    pub photo_source_url: String,
}

impl From<Inference> for InferenceCandidate {
    fn from(inference: Inference) -> Self {
        Self {
            inference_id: inference.id,
            face_id: inference.face.id,
            label_id: inference.label.id,
            label_name: inference.label.name,
            label_description: inference.label.description.filter(|d| !d.is_empty()),
            score: inference.score,
            photo_caption: inference.face.photo.caption,
            photo_image_url: inference.face.image_url,
            photo_source_url: inference.face.photo.source_url,
        }
    }
}

/// Operations available to a registered user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionGateway: Send + Sync {
    /// List labels; an empty filter means all labels
    async fn list_labels(&self, filter: &str) -> Result<Vec<Label>, RecognizerError>;
    /// List pending inferences; no label ids means no restriction
    async fn list_inferences(
        &self,
        label_ids: &[u32],
    ) -> Result<Vec<InferenceCandidate>, RecognizerError>;
    /// Confirm an inference
    async fn accept_inference(&self, inference_id: u32) -> Result<(), RecognizerError>;
    /// Reject an inference
    async fn reject_inference(&self, inference_id: u32) -> Result<(), RecognizerError>;
    /// Upload a photo and return the candidates found in it
    async fn recognize_image(
        &self,
        image: Vec<u8>,
    ) -> Result<Vec<InferenceCandidate>, RecognizerError>;
}

/// Admin-only user provisioning
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRegistrar: Send + Sync {
    /// Register a platform user and return a freshly issued token
    async fn register_user(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<String, RecognizerError>;
}

/// Builds gateways bound to a credential
#[cfg_attr(test, mockall::automock)]
pub trait RecognizerConnector: Send + Sync {
    /// Gateway acting as the given user
    fn user(&self, user_id: &str, token: &str) -> Arc<dyn RecognitionGateway>;
    /// Gateway acting as the admin
    fn admin(&self) -> Arc<dyn UserRegistrar>;
}

/// Credential a client is bound to
#[derive(Clone)]
pub enum Credential {
    /// Privileged identity used for provisioning only
    Admin {
        /// Admin email
        email: String,
        /// Admin token
        token: String,
    },
    /// Regular user identity
    User {
        /// `{user_id}@{platform_domain}`
        email: String,
        /// Issued token
        token: String,
    },
}

impl Credential {
    fn headers(&self) -> (&str, &str) {
        match self {
            Self::Admin { email, token } | Self::User { email, token } => {
                (email.as_str(), token.as_str())
            }
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, email) = match self {
            Self::Admin { email, .. } => ("Admin", email),
            Self::User { email, .. } => ("User", email),
        };
        f.debug_struct(kind).field("email", email).finish_non_exhaustive()
    }
}

/// HTTP client for the recognition service
#[derive(Debug, Clone)]
pub struct RecognizerClient {
    http: HttpClient,
    endpoint: String,
    credential: Credential,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    user_id: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    token: String,
}

impl RecognizerClient {
    /// Create a client bound to `credential`.
    #[must_use]
    pub fn new(http: HttpClient, endpoint: &str, credential: Credential) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let (email, token) = self.credential.headers();
        request
            .header("X-User-Email", email)
            .header("X-User-Token", token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RecognizerError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RecognizerError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn resolve(&self, inference_id: u32, verb: &str) -> Result<(), RecognizerError> {
        let request = self
            .http
            .post(self.url(&format!("/api/inferences/{inference_id}/{verb}")));
        match self.send(request).await {
            Ok(_) => {
                debug!("Inference {} {}ed", inference_id, verb);
                Ok(())
            }
            Err(RecognizerError::Api { status, .. })
                if matches!(status, 404 | 409 | 422) =>
            {
                Err(RecognizerError::AlreadyResolved(inference_id))
            }
            Err(e) => Err(e),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RecognizerError> {
        response
            .json()
            .await
            .map_err(|e| RecognizerError::Json(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: String) -> RecognizerError {
    let message = if body.len() > 500 {
        let cut = (0..=500).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        format!("{}... (truncated)", &body[..cut])
    } else {
        body
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RecognizerError::Unauthorized(format!("{status}"))
        }
        s if s.is_server_error() => RecognizerError::ServiceUnavailable(format!("{s} - {message}")),
        s => RecognizerError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl RecognitionGateway for RecognizerClient {
    async fn list_labels(&self, filter: &str) -> Result<Vec<Label>, RecognizerError> {
        let mut request = self.http.get(self.url("/api/labels"));
        if !filter.is_empty() {
            request = request.query(&[("q", filter)]);
        }
        Self::json(self.send(request).await?).await
    }

    async fn list_inferences(
        &self,
        label_ids: &[u32],
    ) -> Result<Vec<InferenceCandidate>, RecognizerError> {
        let query: Vec<(&str, u32)> = label_ids.iter().map(|id| ("label_id", *id)).collect();
        let request = self.http.get(self.url("/api/inferences")).query(&query);
        let inferences: Vec<Inference> = Self::json(self.send(request).await?).await?;
        Ok(inferences.into_iter().map(Into::into).collect())
    }

    async fn accept_inference(&self, inference_id: u32) -> Result<(), RecognizerError> {
        self.resolve(inference_id, "accept").await
    }

    async fn reject_inference(&self, inference_id: u32) -> Result<(), RecognizerError> {
        self.resolve(inference_id, "reject").await
    }

    async fn recognize_image(
        &self,
        image: Vec<u8>,
    ) -> Result<Vec<InferenceCandidate>, RecognizerError> {
        let part = reqwest::multipart::Part::bytes(image)
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| RecognizerError::ServiceUnavailable(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);
        let request = self.http.post(self.url("/api/recognize")).multipart(form);
        let inferences: Vec<Inference> = Self::json(self.send(request).await?).await?;
        Ok(inferences.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UserRegistrar for RecognizerClient {
    async fn register_user(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<String, RecognizerError> {
        if !matches!(self.credential, Credential::Admin { .. }) {
            return Err(RecognizerError::Unauthorized(
                "user registration requires the admin credential".to_string(),
            ));
        }
        let request = self.http.post(self.url("/api/users")).json(&RegisterRequest {
            user_id,
            name: display_name,
        });
        let response: RegisterResponse = Self::json(self.send(request).await?).await?;
        Ok(response.token)
    }
}

/// Connector producing [`RecognizerClient`]s that share one HTTP pool
#[derive(Debug, Clone)]
pub struct HttpRecognizerConnector {
    http: HttpClient,
    endpoint: String,
    admin_email: String,
    admin_token: String,
    platform_domain: String,
}

impl HttpRecognizerConnector {
    /// Create a connector from settings.
    #[must_use]
    pub fn new(settings: &crate::config::Settings) -> Self {
        Self {
            http: create_http_client(),
            endpoint: settings.recognizer_api_endpoint.clone(),
            admin_email: settings.recognizer_admin_email.clone(),
            admin_token: settings.recognizer_admin_token.clone(),
            platform_domain: settings.platform_domain.clone(),
        }
    }
}

impl RecognizerConnector for HttpRecognizerConnector {
    fn user(&self, user_id: &str, token: &str) -> Arc<dyn RecognitionGateway> {
        Arc::new(RecognizerClient::new(
            self.http.clone(),
            &self.endpoint,
            Credential::User {
                email: format!("{user_id}@{}", self.platform_domain),
                token: token.to_string(),
            },
        ))
    }

    fn admin(&self) -> Arc<dyn UserRegistrar> {
        Arc::new(RecognizerClient::new(
            self.http.clone(),
            &self.endpoint,
            Credential::Admin {
                email: self.admin_email.clone(),
                token: self.admin_token.clone(),
            },
        ))
    }
}
