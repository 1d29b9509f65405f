//! Event routing
//!
//! Every webhook event is handled on its own task. The router classifies the
//! event, resolves the sender's recognizer credential and drives the
//! photo → carousel → accept/reject flow.

use super::{
    accepted_text, rejected_text, CarouselComposer, CarouselError, FAILURE_TEXT,
    NO_CANDIDATES_TEXT, REJECT_TEXT,
};
use crate::config::{CAROUSEL_MAX_COLUMNS, TEMPLATE_ALT_TEXT};
use crate::credentials::{CredentialError, Credentials};
use crate::platform::events::{Event, EventKind, MessageContent};
use crate::platform::{MessagingPlatform, PlatformError};
use crate::postback::{PostbackAction, PostbackError};
use crate::recognizer::{InferenceCandidate, RecognitionGateway, RecognizerError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Query text meaning "every label"
const ALL_LABELS_QUERY: &str = "all";

/// Errors raised while handling a single event
#[derive(Error, Debug)]
pub enum RouterError {
    /// Sender is not an individual user, or the platform did not disclose it
    #[error("Event source is not an individual user")]
    UnauthorizedSource,
    /// Event needs a reply but carries no reply token
    #[error("Missing reply token")]
    MissingReplyToken,
    /// Malformed postback data
    #[error("Postback error: {0}")]
    Postback(#[from] PostbackError),
    /// Recognition service failure
    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    /// Credential could not be resolved
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
    /// Messaging platform failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    /// Carousel could not be built
    #[error("Carousel error: {0}")]
    Carousel(#[from] CarouselError),
}

/// What handling an event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sender's credential exists now
    Provisioned,
    /// A text reply was sent
    Replied(String),
    /// A carousel was sent
    CarouselSent {
        /// Number of columns shown
        columns: usize,
    },
    /// Nothing to do
    Ignored,
}

/// Router behaviour switches
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Treat text messages as label queries
    pub text_query_enabled: bool,
    /// Columns per carousel
    pub max_columns: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            text_query_enabled: false,
            max_columns: CAROUSEL_MAX_COLUMNS,
        }
    }
}

/// Dispatches webhook events
pub struct EventRouter {
    platform: Arc<dyn MessagingPlatform>,
    credentials: Arc<Credentials>,
    composer: CarouselComposer,
    options: RouterOptions,
}

impl EventRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        credentials: Arc<Credentials>,
        composer: CarouselComposer,
        options: RouterOptions,
    ) -> Self {
        Self {
            platform,
            credentials,
            composer,
            options,
        }
    }

    /// Spawn one task per event and return without waiting for them.
    ///
    /// Tasks run concurrently with no ordering guarantee. The handles are
    /// returned for callers that do want to wait (tests, graceful shutdown).
    pub fn dispatch(self: &Arc<Self>, events: Vec<Event>) -> Vec<JoinHandle<()>> {
        events
            .into_iter()
            .map(|event| {
                let router = Arc::clone(self);
                let span = info_span!("event", id = %Uuid::new_v4(), kind = kind_name(&event.kind));
                tokio::spawn(async move { router.process(event).await }.instrument(span))
            })
            .collect()
    }

    /// Handle one event, logging failures instead of returning them.
    async fn process(&self, event: Event) {
        let error = match self.handle(&event).await {
            Ok(outcome) => {
                debug!(?outcome, "Event handled");
                return;
            }
            Err(e) => e,
        };

        match (&error, &event.kind) {
            (RouterError::UnauthorizedSource, _) => {
                warn!(
                    source = ?event.source,
                    kind = kind_name(&event.kind),
                    "Ignoring event without an individual sender"
                );
            }
            (_, EventKind::Message { .. }) => {
                error!("Message handling failed: {}", error);
                if let Some(reply_token) = event.reply_token.as_deref() {
                    if let Err(e) = self.platform.reply_text(reply_token, FAILURE_TEXT).await {
                        error!("Failed to send failure reply: {}", e);
                    }
                }
            }
            _ => error!("Event handling failed: {}", error),
        }
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::UnauthorizedSource` for postbacks outside
    /// one-to-one chats and any failure of the follow or message flows.
    /// Postback failures after authorization are answered with an apology
    /// and reported as `Ok(Outcome::Replied(..))`.
    pub async fn handle(&self, event: &Event) -> Result<Outcome, RouterError> {
        match &event.kind {
            EventKind::Follow => self.handle_follow(event).await,
            EventKind::Message { message } => match message {
                MessageContent::Image { id } => self.handle_image(event, id).await,
                MessageContent::Text { text, .. } => self.handle_text(event, text).await,
                MessageContent::Other => Ok(Outcome::Ignored),
            },
            EventKind::Postback { postback } => self.handle_postback(event, &postback.data).await,
            EventKind::Unknown => {
                info!(source = ?event.source, "Unhandled event type");
                Ok(Outcome::Ignored)
            }
        }
    }

    async fn handle_follow(&self, event: &Event) -> Result<Outcome, RouterError> {
        let user_id = event
            .source
            .user_id()
            .ok_or(RouterError::UnauthorizedSource)?;
        self.credentials.token(user_id).await?;
        info!(user_id = %user_id, "New follower ready");
        Ok(Outcome::Provisioned)
    }

    async fn handle_image(&self, event: &Event, message_id: &str) -> Result<Outcome, RouterError> {
        let user_id = event
            .source
            .user_id()
            .ok_or(RouterError::UnauthorizedSource)?;
        let reply_token = reply_token(event)?;

        let image = self.platform.get_message_content(message_id).await?;
        debug!(bytes = image.len(), "Downloaded image {}", message_id);

        let candidates = self
            .with_gateway(user_id, |gateway| {
                let image = image.clone();
                async move { gateway.recognize_image(image).await }
            })
            .await?;
        self.reply_candidates(reply_token, &candidates).await
    }

    async fn handle_text(&self, event: &Event, text: &str) -> Result<Outcome, RouterError> {
        let text = text.trim();
        if !self.options.text_query_enabled || text == REJECT_TEXT {
            return Ok(Outcome::Ignored);
        }
        let user_id = event
            .source
            .user_id()
            .ok_or(RouterError::UnauthorizedSource)?;
        let reply_token = reply_token(event)?;

        let filter = if text == ALL_LABELS_QUERY { "" } else { text };
        let candidates = self
            .with_gateway(user_id, |gateway| query_candidates(gateway, filter.to_string()))
            .await?;
        self.reply_candidates(reply_token, &candidates).await
    }

    async fn handle_postback(&self, event: &Event, data: &str) -> Result<Outcome, RouterError> {
        let user_id = event
            .source
            .individual_user()
            .ok_or(RouterError::UnauthorizedSource)?;
        let reply_token = reply_token(event)?;
        info!(user_id = %user_id, "Postback received: {}", data);

        let text = match self.resolve(user_id, data).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id = %user_id, "Postback failed: {}", e);
                FAILURE_TEXT.to_string()
            }
        };
        self.platform.reply_text(reply_token, &text).await?;
        Ok(Outcome::Replied(text))
    }

    /// Apply a postback and return the confirmation text.
    async fn resolve(&self, user_id: &str, data: &str) -> Result<String, RouterError> {
        let action = PostbackAction::decode(data)?;
        let inference_id = action.inference_id();
        match action {
            PostbackAction::Accept { face_id, .. } => {
                self.with_gateway(user_id, |gateway| async move {
                    gateway.accept_inference(inference_id).await
                })
                .await?;
                Ok(accepted_text(face_id))
            }
            PostbackAction::Reject { face_id, .. } => {
                self.with_gateway(user_id, |gateway| async move {
                    gateway.reject_inference(inference_id).await
                })
                .await?;
                Ok(rejected_text(face_id))
            }
        }
    }

    /// Run `op` as `user_id`, rotating the credential once if it was rejected.
    async fn with_gateway<T, F, Fut>(&self, user_id: &str, op: F) -> Result<T, RouterError>
    where
        F: Fn(Arc<dyn RecognitionGateway>) -> Fut,
        Fut: Future<Output = Result<T, RecognizerError>>,
    {
        let gateway = self.credentials.gateway(user_id).await?;
        match op(gateway).await {
            Err(RecognizerError::Unauthorized(reason)) => {
                warn!(user_id = %user_id, "Recognizer rejected credential: {}", reason);
                let gateway = self.credentials.rotate(user_id).await?;
                Ok(op(gateway).await?)
            }
            result => Ok(result?),
        }
    }

    async fn reply_candidates(
        &self,
        reply_token: &str,
        candidates: &[InferenceCandidate],
    ) -> Result<Outcome, RouterError> {
        if candidates.is_empty() {
            self.platform
                .reply_text(reply_token, NO_CANDIDATES_TEXT)
                .await?;
            return Ok(Outcome::Replied(NO_CANDIDATES_TEXT.to_string()));
        }

        let carousel =
            self.composer
                .compose(candidates, self.options.max_columns, &mut rand::thread_rng())?;
        let columns = carousel.columns.len();
        self.platform
            .reply_template(reply_token, TEMPLATE_ALT_TEXT, carousel)
            .await?;
        info!(columns, candidates = candidates.len(), "Sent candidate carousel");
        Ok(Outcome::CarouselSent { columns })
    }
}

async fn query_candidates(
    gateway: Arc<dyn RecognitionGateway>,
    filter: String,
) -> Result<Vec<InferenceCandidate>, RecognizerError> {
    let labels = gateway.list_labels(&filter).await?;
    if labels.is_empty() {
        return Ok(Vec::new());
    }
    let label_ids: Vec<u32> = labels.iter().map(|label| label.id).collect();
    gateway.list_inferences(&label_ids).await
}

fn reply_token(event: &Event) -> Result<&str, RouterError> {
    event
        .reply_token
        .as_deref()
        .ok_or(RouterError::MissingReplyToken)
}

const fn kind_name(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Follow => "follow",
        EventKind::Message { .. } => "message",
        EventKind::Postback { .. } => "postback",
        EventKind::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, MemoryCredentialStore, UserCredential};
    use crate::crypto::{ThumbnailSigner, TokenCipher};
    use crate::platform::events::{Postback, Source};
    use crate::platform::{MockMessagingPlatform, Profile};
    use crate::recognizer::{
        Label, MockRecognitionGateway, MockRecognizerConnector, MockUserRegistrar,
    };
    use mockall::predicate::eq;

    fn user() -> Source {
        Source::User {
            user_id: "U1".to_string(),
        }
    }

    fn event(source: Source, kind: EventKind) -> Event {
        Event {
            reply_token: Some("r1".to_string()),
            source,
            kind,
        }
    }

    fn postback(source: Source, data: &str) -> Event {
        event(
            source,
            EventKind::Postback {
                postback: Postback {
                    data: data.to_string(),
                },
            },
        )
    }

    fn candidate(n: u32) -> InferenceCandidate {
        InferenceCandidate {
            inference_id: 100 + n,
            face_id: n,
            label_id: 1,
            label_name: "Alice".to_string(),
            label_description: None,
            score: 0.9,
            photo_caption: String::new(),
            photo_image_url: format!("https://img.example.com/{n}.jpg"),
            photo_source_url: format!("https://example.com/{n}"),
        }
    }

    fn cipher() -> Arc<TokenCipher> {
        match TokenCipher::new(b"0123456789abcdef") {
            Ok(cipher) => Arc::new(cipher),
            Err(e) => panic!("cipher: {e}"),
        }
    }

    fn signer() -> ThumbnailSigner {
        match ThumbnailSigner::new(b"secret") {
            Ok(signer) => signer,
            Err(e) => panic!("signer: {e}"),
        }
    }

    /// Connector handing out `gateway` for the stored token `tok`
    fn connector_for(gateway: MockRecognitionGateway) -> MockRecognizerConnector {
        let gateway: Arc<dyn RecognitionGateway> = Arc::new(gateway);
        let mut connector = MockRecognizerConnector::new();
        connector
            .expect_user()
            .withf(|user_id, token| user_id == "U1" && token == "tok")
            .returning(move |_, _| gateway.clone());
        connector.expect_admin().never();
        connector
    }

    async fn router(
        platform: MockMessagingPlatform,
        connector: MockRecognizerConnector,
        options: RouterOptions,
    ) -> Arc<EventRouter> {
        let platform: Arc<dyn MessagingPlatform> = Arc::new(platform);
        let store = Arc::new(MemoryCredentialStore::new());
        let seeded = store
            .save(UserCredential {
                user_id: "U1".to_string(),
                service_token: "tok".to_string(),
                encrypted_at_rest: false,
            })
            .await;
        assert!(seeded.is_ok());

        let credentials = Arc::new(Credentials::new(
            store,
            cipher(),
            platform.clone(),
            Arc::new(connector),
            100,
        ));
        Arc::new(EventRouter::new(
            platform,
            credentials,
            CarouselComposer::new("https://bot.example.com/thumbnail", signer(), false),
            options,
        ))
    }

    fn expect_reply(platform: &mut MockMessagingPlatform, expected: String) {
        platform
            .expect_reply_text()
            .withf(move |token, text| token == "r1" && text == expected)
            .times(1)
            .returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn test_accept_postback() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_accept_inference()
            .with(eq(17))
            .times(1)
            .returning(|_| Ok(()));
        let mut platform = MockMessagingPlatform::new();
        expect_reply(&mut platform, accepted_text(42));

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let outcome = router
            .handle(&postback(user(), "action=accept&face=42&inference=17"))
            .await?;
        assert_eq!(outcome, Outcome::Replied("ID:42 を更新しました 🙆".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_postback() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_reject_inference()
            .with(eq(9))
            .times(1)
            .returning(|_| Ok(()));
        let mut platform = MockMessagingPlatform::new();
        expect_reply(&mut platform, rejected_text(3));

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let outcome = router
            .handle(&postback(user(), "inference=9&action=reject&face=3"))
            .await?;
        assert_eq!(outcome, Outcome::Replied(rejected_text(3)));
        Ok(())
    }

    #[tokio::test]
    async fn test_already_resolved_inference_gets_apology() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_accept_inference()
            .with(eq(17))
            .times(1)
            .returning(|id| Err(RecognizerError::AlreadyResolved(id)));
        let mut platform = MockMessagingPlatform::new();
        expect_reply(&mut platform, FAILURE_TEXT.to_string());

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let outcome = router
            .handle(&postback(user(), "action=accept&face=42&inference=17"))
            .await?;
        assert_eq!(outcome, Outcome::Replied(FAILURE_TEXT.to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_postback_gets_apology() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway.expect_accept_inference().never();
        let mut platform = MockMessagingPlatform::new();
        expect_reply(&mut platform, FAILURE_TEXT.to_string());

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let outcome = router
            .handle(&postback(user(), "action=accept&face=42"))
            .await?;
        assert_eq!(outcome, Outcome::Replied(FAILURE_TEXT.to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_group_postback_is_rejected() {
        let mut connector = MockRecognizerConnector::new();
        connector.expect_user().never();
        connector.expect_admin().never();
        let mut platform = MockMessagingPlatform::new();
        platform.expect_reply_text().never();

        let router = router(platform, connector, RouterOptions::default()).await;
        let group = Source::Group {
            group_id: "G1".to_string(),
            user_id: Some("U1".to_string()),
        };
        let result = router
            .handle(&postback(group, "action=accept&face=42&inference=17"))
            .await;
        assert!(matches!(result, Err(RouterError::UnauthorizedSource)));
    }

    #[tokio::test]
    async fn test_image_from_undisclosed_room_sender_is_rejected() {
        let mut connector = MockRecognizerConnector::new();
        connector.expect_user().never();
        connector.expect_admin().never();
        let mut platform = MockMessagingPlatform::new();
        platform.expect_get_message_content().never();
        platform.expect_reply_text().never();

        let router = router(platform, connector, RouterOptions::default()).await;
        let room = Source::Room {
            room_id: "R1".to_string(),
            user_id: None,
        };
        let image = event(
            room,
            EventKind::Message {
                message: MessageContent::Image {
                    id: "m1".to_string(),
                },
            },
        );
        assert!(matches!(
            router.handle(&image).await,
            Err(RouterError::UnauthorizedSource)
        ));
        // The task boundary only logs; no apology goes out
        router.process(image).await;
    }

    #[tokio::test]
    async fn test_image_message_sends_carousel() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_recognize_image()
            .withf(|image| image == b"jpeg")
            .times(1)
            .returning(|_| Ok((0..8).map(candidate).collect()));
        let mut platform = MockMessagingPlatform::new();
        platform
            .expect_get_message_content()
            .with(eq("m1"))
            .returning(|_| Ok(b"jpeg".to_vec()));
        platform
            .expect_reply_template()
            .withf(|token, alt, carousel| {
                token == "r1" && alt == TEMPLATE_ALT_TEXT && carousel.columns.len() == 5
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let image = event(
            user(),
            EventKind::Message {
                message: MessageContent::Image {
                    id: "m1".to_string(),
                },
            },
        );
        assert_eq!(
            router.handle(&image).await?,
            Outcome::CarouselSent { columns: 5 }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_image_without_candidates() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_recognize_image()
            .returning(|_| Ok(Vec::new()));
        let mut platform = MockMessagingPlatform::new();
        platform
            .expect_get_message_content()
            .returning(|_| Ok(b"jpeg".to_vec()));
        platform.expect_reply_template().never();
        expect_reply(&mut platform, NO_CANDIDATES_TEXT.to_string());

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let image = event(
            user(),
            EventKind::Message {
                message: MessageContent::Image {
                    id: "m1".to_string(),
                },
            },
        );
        assert_eq!(
            router.handle(&image).await?,
            Outcome::Replied(NO_CANDIDATES_TEXT.to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_text_is_ignored_unless_enabled() -> Result<(), RouterError> {
        let mut connector = MockRecognizerConnector::new();
        connector.expect_user().never();
        let router = router(MockMessagingPlatform::new(), connector, RouterOptions::default()).await;

        let text = event(
            user(),
            EventKind::Message {
                message: MessageContent::Text {
                    id: "m2".to_string(),
                    text: "Alice".to_string(),
                },
            },
        );
        assert_eq!(router.handle(&text).await?, Outcome::Ignored);
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_text_is_always_ignored() -> Result<(), RouterError> {
        let mut connector = MockRecognizerConnector::new();
        connector.expect_user().never();
        let options = RouterOptions {
            text_query_enabled: true,
            ..RouterOptions::default()
        };
        let router = router(MockMessagingPlatform::new(), connector, options).await;

        let text = event(
            user(),
            EventKind::Message {
                message: MessageContent::Text {
                    id: "m2".to_string(),
                    text: REJECT_TEXT.to_string(),
                },
            },
        );
        assert_eq!(router.handle(&text).await?, Outcome::Ignored);
        Ok(())
    }

    #[tokio::test]
    async fn test_text_query_all_labels() -> Result<(), RouterError> {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_list_labels()
            .with(eq(""))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    Label {
                        id: 1,
                        name: "Alice".to_string(),
                        description: None,
                    },
                    Label {
                        id: 2,
                        name: "Bob".to_string(),
                        description: None,
                    },
                ])
            });
        gateway
            .expect_list_inferences()
            .withf(|ids| ids == [1, 2])
            .times(1)
            .returning(|_| Ok(vec![candidate(1), candidate(2)]));
        let mut platform = MockMessagingPlatform::new();
        platform
            .expect_reply_template()
            .withf(|_, _, carousel| carousel.columns.len() == 2)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let options = RouterOptions {
            text_query_enabled: true,
            ..RouterOptions::default()
        };
        let router = router(platform, connector_for(gateway), options).await;
        let text = event(
            user(),
            EventKind::Message {
                message: MessageContent::Text {
                    id: "m2".to_string(),
                    text: "all".to_string(),
                },
            },
        );
        assert_eq!(
            router.handle(&text).await?,
            Outcome::CarouselSent { columns: 2 }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_credential_is_rotated_once() -> Result<(), RouterError> {
        let mut stale = MockRecognitionGateway::new();
        stale
            .expect_accept_inference()
            .times(1)
            .returning(|_| Err(RecognizerError::Unauthorized("401".to_string())));
        let stale: Arc<dyn RecognitionGateway> = Arc::new(stale);
        let mut fresh = MockRecognitionGateway::new();
        fresh
            .expect_accept_inference()
            .with(eq(17))
            .times(1)
            .returning(|_| Ok(()));
        let fresh: Arc<dyn RecognitionGateway> = Arc::new(fresh);

        let mut connector = MockRecognizerConnector::new();
        connector
            .expect_user()
            .withf(|_, token| token == "tok")
            .returning(move |_, _| stale.clone());
        connector
            .expect_user()
            .withf(|_, token| token == "tok-new")
            .returning(move |_, _| fresh.clone());
        connector.expect_admin().times(1).returning(|| {
            let mut registrar = MockUserRegistrar::new();
            registrar
                .expect_register_user()
                .returning(|_, _| Ok("tok-new".to_string()));
            Arc::new(registrar)
        });

        let mut platform = MockMessagingPlatform::new();
        platform.expect_get_profile().returning(|user_id| {
            Ok(Profile {
                user_id: user_id.to_string(),
                display_name: "Alice".to_string(),
            })
        });
        expect_reply(&mut platform, accepted_text(42));

        let router = router(platform, connector, RouterOptions::default()).await;
        let outcome = router
            .handle(&postback(user(), "action=accept&face=42&inference=17"))
            .await?;
        assert_eq!(outcome, Outcome::Replied(accepted_text(42)));
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_provisions_credential() -> Result<(), RouterError> {
        let router = router(
            MockMessagingPlatform::new(),
            connector_for(MockRecognitionGateway::new()),
            RouterOptions::default(),
        )
        .await;
        let follow = event(user(), EventKind::Follow);
        assert_eq!(router.handle(&follow).await?, Outcome::Provisioned);
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_runs_every_event() {
        let mut gateway = MockRecognitionGateway::new();
        gateway
            .expect_accept_inference()
            .times(2)
            .returning(|_| Ok(()));
        let mut platform = MockMessagingPlatform::new();
        platform
            .expect_reply_text()
            .times(2)
            .returning(|_, _| Ok(()));

        let router = router(platform, connector_for(gateway), RouterOptions::default()).await;
        let events = vec![
            postback(user(), "action=accept&face=1&inference=11"),
            postback(user(), "action=accept&face=2&inference=12"),
            event(user(), EventKind::Unknown),
        ];
        for handle in router.dispatch(events) {
            assert!(handle.await.is_ok());
        }
    }
}
