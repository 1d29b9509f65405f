use dotenvy::dotenv;
use face_manager_bot::bot::{CarouselComposer, EventRouter, RouterOptions};
use face_manager_bot::config::{get_credential_cache_max_size, Settings};
use face_manager_bot::credentials::{Credentials, MemoryCredentialStore};
use face_manager_bot::crypto::{ThumbnailSigner, TokenCipher};
use face_manager_bot::platform::{LineClient, MessagingPlatform};
use face_manager_bot::recognizer::{HttpRecognizerConnector, RecognizerConnector};
use face_manager_bot::utils::create_http_client;
use face_manager_bot::webhook::{self, WebhookState};
use regex::Regex;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    bearer: Regex,
    user_token_header: Regex,
    token_field: Regex,
    env_secret: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bearer: Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9+/=._-]+")?,
            user_token_header: Regex::new(r#"(?i)("?x-user-token"?\s*[:=]\s*"?)[^"\s,}]+"#)?,
            token_field: Regex::new(r#"("(?:token|service_token)"\s*:\s*")[^"]*"#)?,
            env_secret: Regex::new(
                r"((?:CHANNEL_SECRET|CHANNEL_TOKEN|TOKEN_CIPHER_KEY|RECOGNIZER_ADMIN_TOKEN)=)[^\s&]+",
            )?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .bearer
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .user_token_header
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .token_field
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .env_secret
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting face manager bot...");

    let settings = init_settings();
    let cipher = init_cipher(&settings);
    let thumbnail_signer = init_thumbnail_signer(&settings);

    let platform: Arc<dyn MessagingPlatform> = Arc::new(LineClient::new(&settings.channel_token));
    let connector: Arc<dyn RecognizerConnector> =
        Arc::new(HttpRecognizerConnector::new(&settings));
    info!(
        "Recognizer client ready ({})",
        settings.recognizer_api_endpoint
    );

    let credentials = init_credentials(cipher, platform.clone(), connector);

    let router = Arc::new(EventRouter::new(
        platform,
        credentials,
        CarouselComposer::new(
            settings.thumbnail_base_url(),
            thumbnail_signer.clone(),
            settings.reject_via_postback,
        ),
        RouterOptions {
            text_query_enabled: settings.text_query_enabled,
            ..RouterOptions::default()
        },
    ));

    let state = WebhookState {
        channel_secret: Arc::from(settings.channel_secret.as_str()),
        router,
        http: create_http_client(),
        thumbnail_signer,
    };
    let app = webhook::build_router(state, &settings.callback_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("Bot is running, callback at {}", settings.callback_path);
    webhook::run_server(addr, app).await
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_cipher(settings: &Settings) -> Arc<TokenCipher> {
    match TokenCipher::from_base64(&settings.token_cipher_key) {
        Ok(cipher) => {
            info!("Token cipher initialized: {:?}", cipher);
            Arc::new(cipher)
        }
        Err(e) => {
            error!("Failed to initialize token cipher: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_thumbnail_signer(settings: &Settings) -> ThumbnailSigner {
    match ThumbnailSigner::new(settings.channel_secret.as_bytes()) {
        Ok(signer) => signer,
        Err(e) => {
            error!("Failed to initialize thumbnail signer: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_credentials(
    cipher: Arc<TokenCipher>,
    platform: Arc<dyn MessagingPlatform>,
    connector: Arc<dyn RecognizerConnector>,
) -> Arc<Credentials> {
    let max_size = get_credential_cache_max_size();
    info!("Initializing credential cache (max_size: {})", max_size);

    Arc::new(Credentials::new(
        Arc::new(MemoryCredentialStore::new()),
        cipher,
        platform,
        connector,
        max_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        assert_eq!(
            patterns.redact("authorization: Bearer abc.DEF-123"),
            "authorization: Bearer [MASKED]"
        );
        assert_eq!(
            patterns.redact(r#"{"x-user-token": "s3cr3t", "x-user-email": "U1@line.me"}"#),
            r#"{"x-user-token": "[MASKED]", "x-user-email": "U1@line.me"}"#
        );
        assert_eq!(
            patterns.redact(r#"{"token":"issued"}"#),
            r#"{"token":"[MASKED]"}"#
        );
        assert_eq!(
            patterns.redact("TOKEN_CIPHER_KEY=MDEy other"),
            "TOKEN_CIPHER_KEY=[MASKED] other"
        );
        Ok(())
    }
}
