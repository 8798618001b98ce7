//! Shape checks for client-supplied ciphertext.
//!
//! The relay never decrypts anything. It only insists that the body is
//! standard base64 and decodes to a 12-byte nonce followed by at least one
//! byte of sealed payload. Line breaks inside the text are skipped when
//! decoding, so wrapped (MIME-style) bodies are accepted.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Length of the client's AEAD nonce.
pub const NONCE_LEN: usize = 12;

/// Smallest acceptable decoded length.
pub const MIN_DECODED_LEN: usize = NONCE_LEN + 1;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is empty")]
    Empty,

    #[error("Payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Payload decodes to {0} bytes, need at least {MIN_DECODED_LEN}")]
    TooShort(usize),
}

/// Validated ciphertext, kept in the encoded form the client sent.
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext {
    encoded: String,
    decoded_len: usize,
}

impl Ciphertext {
    /// Validate a request body. Surrounding whitespace is ignored.
    pub fn parse(body: &str) -> Result<Self, PayloadError> {
        let encoded = body.trim();
        if encoded.is_empty() {
            return Err(PayloadError::Empty);
        }

        let unwrapped: String = encoded.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        let decoded_len = BASE64.decode(unwrapped)?.len();
        if decoded_len < MIN_DECODED_LEN {
            return Err(PayloadError::TooShort(decoded_len));
        }

        Ok(Self {
            encoded: encoded.to_string(),
            decoded_len,
        })
    }

    /// The base64 text as stored and served back.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

// Keep ciphertext out of logs.
impl std::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ciphertext")
            .field("decoded_len", &self.decoded_len)
            .finish_non_exhaustive()
    }
}
