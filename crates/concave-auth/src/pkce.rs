//! Client-side PKCE and state/nonce generation (RFC 7636), mirroring the
//! verification logic the provider applies on the other end of the exchange.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

const VERIFIER_BYTES: usize = 32;

/// A freshly generated verifier/challenge pair plus the random `state` and
/// `nonce` used to correlate the authorize request with its callback.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
    pub nonce: String,
}

impl PkcePair {
    /// Generates a new verifier (32 random bytes, base64url -> 43 chars),
    /// its SHA-256 challenge, and a random state and nonce.
    pub fn generate() -> Self {
        let verifier = random_url_safe_token(VERIFIER_BYTES);
        let challenge = challenge_for(&verifier);
        let state = random_url_safe_token(VERIFIER_BYTES);
        let nonce = random_url_safe_token(VERIFIER_BYTES);
        Self { verifier, challenge, state, nonce }
    }
}

/// `base64url(sha256(verifier))`, the S256 PKCE challenge.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_url_safe_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_verifier_meets_the_minimum_length() {
        let pair = PkcePair::generate();
        assert!(pair.verifier.len() >= 43);
        assert!(pair.challenge.len() >= 43);
    }

    #[test]
    fn challenge_is_deterministic_given_a_verifier() {
        let pair = PkcePair::generate();
        assert_eq!(challenge_for(&pair.verifier), pair.challenge);
    }

    #[test]
    fn state_and_nonce_are_distinct_per_call() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.state, b.state);
        assert_ne!(a.nonce, b.nonce);
    }
}
