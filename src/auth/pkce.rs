//! Random values for the authorization-code handshake.
//!
//! The state token guards the callback against forged redirects; the PKCE pair
//! (RFC 7636) binds the code to this process.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Unpredictable state token echoed back by the provider on redirect.
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceCodes {
    pub verifier: String,
    pub challenge: String,
}

impl PkceCodes {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}
