#![deny(missing_docs)]
//! Face manager bot library.
//!
//! Bridges messaging platform webhooks to a face recognition service: photos
//! go in, candidate carousels come back, and users confirm or reject each
//! inference with a tap.

/// Event routing and carousel composition.
pub mod bot;
/// Configuration management.
pub mod config;
/// Per-user recognizer credentials.
pub mod credentials;
/// Token encryption.
pub mod crypto;
/// Messaging platform client and webhook events.
pub mod platform;
/// Postback payload codec.
pub mod postback;
/// Recognition service client.
pub mod recognizer;
/// Utility functions.
pub mod utils;
/// HTTP server.
pub mod webhook;
