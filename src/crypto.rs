//! Token encryption
//!
//! Protects recognizer tokens at rest with AES in full-block CFB mode.
//! Every ciphertext carries its own random IV:
//!
//! ```text
//! base64_nopad( iv(16) || cfb(key, iv, plaintext) )
//! ```
//!
//! Also signs thumbnail proxy URLs so the proxy only fetches images the bot
//! itself linked to.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// AES block size, which is also the IV length
pub const IV_LEN: usize = 16;

type Aes128CfbEnc = cfb_mode::Encryptor<aes::Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<aes::Aes128>;
type Aes192CfbEnc = cfb_mode::Encryptor<aes::Aes192>;
type Aes192CfbDec = cfb_mode::Decryptor<aes::Aes192>;
type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Derivation label separating URL signatures from webhook signatures
const THUMBNAIL_KEY_CONTEXT: &[u8] = b"face-manager-bot/thumbnail-url";

/// Errors raised while encrypting or decrypting tokens
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Ciphertext is not valid unpadded base64
    #[error("Malformed ciphertext encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    /// Ciphertext is shorter than one IV
    #[error("Ciphertext too short: {len} bytes")]
    Truncated {
        /// Decoded length
        len: usize,
    },
    /// Key material has a length AES does not accept
    #[error("Invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),
    /// Key material is missing or not decodable
    #[error("Cipher key unavailable: {0}")]
    KeyUnavailable(String),
    /// The system random source failed
    #[error("Entropy source failed: {0}")]
    Entropy(String),
    /// Decrypted bytes are not UTF-8
    #[error("Decrypted token is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone)]
enum CipherKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

/// Symmetric cipher for recognizer tokens.
///
/// Built once at startup and shared read-only between event tasks.
#[derive(Clone)]
pub struct TokenCipher {
    key: CipherKey,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self.key {
            CipherKey::Aes128(_) => 128,
            CipherKey::Aes192(_) => 192,
            CipherKey::Aes256(_) => 256,
        };
        f.debug_struct("TokenCipher").field("bits", &bits).finish()
    }
}

impl TokenCipher {
    /// Create a cipher from raw key bytes. The key length selects AES-128/192/256.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` for any other length.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key = match key.len() {
            16 => CipherKey::Aes128(copy_key(key)),
            24 => CipherKey::Aes192(copy_key(key)),
            32 => CipherKey::Aes256(copy_key(key)),
            n => return Err(CryptoError::InvalidKeyLength(n)),
        };
        Ok(Self { key })
    }

    /// Create a cipher from base64 key material, as found in configuration.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyUnavailable` if the value is empty or not
    /// base64, `CryptoError::InvalidKeyLength` if it decodes to a bad length.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::KeyUnavailable("empty key".to_string()));
        }
        let raw = STANDARD
            .decode(encoded)
            .or_else(|_| STANDARD_NO_PAD.decode(encoded))
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
        Self::new(&raw)
    }

    /// Encrypt a token with a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Entropy` if the OS random source fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut buf = vec![0u8; IV_LEN + plaintext.len()];
        let (iv, body) = buf.split_at_mut(IV_LEN);
        OsRng
            .try_fill_bytes(iv)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;
        body.copy_from_slice(plaintext.as_bytes());

        let iv: &[u8] = iv;
        match &self.key {
            CipherKey::Aes128(k) => Aes128CfbEnc::new(k.into(), iv.into()).encrypt(body),
            CipherKey::Aes192(k) => Aes192CfbEnc::new(k.into(), iv.into()).encrypt(body),
            CipherKey::Aes256(k) => Aes256CfbEnc::new(k.into(), iv.into()).encrypt(body),
        }

        Ok(STANDARD_NO_PAD.encode(&buf))
    }

    /// Decrypt a value produced by [`TokenCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encoding` for bad base64, `CryptoError::Truncated`
    /// if the input is shorter than an IV and `CryptoError::Utf8` if the
    /// recovered bytes are not text.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let mut buf = STANDARD_NO_PAD.decode(ciphertext)?;
        if buf.len() < IV_LEN {
            return Err(CryptoError::Truncated { len: buf.len() });
        }
        let (iv, body) = buf.split_at_mut(IV_LEN);

        let iv: &[u8] = iv;
        match &self.key {
            CipherKey::Aes128(k) => Aes128CfbDec::new(k.into(), iv.into()).decrypt(body),
            CipherKey::Aes192(k) => Aes192CfbDec::new(k.into(), iv.into()).decrypt(body),
            CipherKey::Aes256(k) => Aes256CfbDec::new(k.into(), iv.into()).decrypt(body),
        }

        Ok(String::from_utf8(body.to_vec())?)
    }
}

/// HMAC-SHA256 signer for thumbnail proxy URLs.
///
/// The key is derived from a shared secret, so one secret can back both the
/// webhook check and URL signing without their signatures being interchangeable.
#[derive(Clone)]
pub struct ThumbnailSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for ThumbnailSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailSigner").finish_non_exhaustive()
    }
}

impl ThumbnailSigner {
    /// Derive a signer from `secret`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyUnavailable` if the secret is empty.
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyUnavailable("empty signing secret".to_string()));
        }
        let mut derive = HmacSha256::new_from_slice(secret)
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
        derive.update(THUMBNAIL_KEY_CONTEXT);
        let key = derive.finalize().into_bytes();
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Signature of `image_url`, URL-safe base64 without padding.
    #[must_use]
    pub fn sign(&self, image_url: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(image_url.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Check `signature` against `image_url` in constant time.
    #[must_use]
    pub fn verify(&self, image_url: &str, signature: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(image_url.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

fn copy_key<const N: usize>(key: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(key);
    out
}
