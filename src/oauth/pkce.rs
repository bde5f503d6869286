//! PKCE (Proof Key for Code Exchange) implementation.
//!
//! Provides the random values used by the authorization-code flow:
//! - Code verifier generation (32 random bytes, base64url without padding)
//! - S256 code challenge derivation using SHA-256
//! - State token generation (24 random bytes, same encoding)
//!
//! The state token is an anti-CSRF correlation value only; it has no
//! cryptographic relation to the verifier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE challenge method constant.
pub const PKCE_METHOD: &str = "S256";

/// Number of random bytes behind a code verifier (encodes to 43 chars).
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes behind a state token (encodes to 32 chars).
const STATE_BYTES: usize = 24;

/// Generate a cryptographically random code verifier.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe(VERIFIER_BYTES)
}

/// Derive the S256 code challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF protection.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(STATE_BYTES)
}

fn random_urlsafe(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// PKCE verifier/challenge pair for one authorization attempt.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// The code verifier (secret, sent only during token exchange).
    pub verifier: String,

    /// The code challenge (sent in the authorization URL).
    pub challenge: String,

    /// The challenge method (always "S256").
    pub method: &'static str,
}

impl Pkce {
    /// Generate a fresh verifier and its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: PKCE_METHOD,
        }
    }

    /// Verify that a challenge matches a verifier.
    #[must_use]
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        generate_code_challenge(verifier) == challenge
    }
}
