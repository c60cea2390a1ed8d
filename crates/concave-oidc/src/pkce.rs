//! PKCE (RFC 7636) verification, S256 only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::types::PkceMethod;

/// `base64url(sha256(code_verifier)) == code_challenge`, method S256 only.
pub fn verify(code_verifier: &str, code_challenge: &str, method: PkceMethod) -> bool {
    match method {
        PkceMethod::S256 => {
            let digest = Sha256::digest(code_verifier.as_bytes());
            let computed = URL_SAFE_NO_PAD.encode(digest);
            computed == code_challenge
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_verifier_challenge_pair_matches() {
        // From RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify(verifier, challenge, PkceMethod::S256));
    }

    #[test]
    fn mismatched_verifier_fails() {
        assert!(!verify("not-the-verifier", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM", PkceMethod::S256));
    }
}
