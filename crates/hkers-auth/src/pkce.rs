//! CSRF state and PKCE generation
//!
//! Both values come straight from the operating system's CSPRNG. An entropy
//! failure is surfaced as [`AuthError::Internal`] and is not retryable.
//!
//! The code challenge follows RFC 7636 `S256`:
//! `BASE64URL-NOPAD(SHA256(ASCII(code_verifier)))`.

use crate::error::{AuthError, AuthResult};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind the state and the verifier (256 bits).
pub const RANDOM_BYTES: usize = 32;

/// PKCE challenge method sent to the provider.
pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and its derived challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret kept server-side until the code exchange
    pub verifier: String,

    /// Public challenge sent with the authorization request
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

fn random_bytes() -> AuthResult<[u8; RANDOM_BYTES]> {
    let mut buf = [0u8; RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| AuthError::Internal(format!("Entropy source failure: {}", e)))?;
    Ok(buf)
}

/// Generate a random CSRF state (standard base64, 44 characters).
pub fn generate_state() -> AuthResult<String> {
    Ok(STANDARD.encode(random_bytes()?))
}

/// Generate a PKCE verifier/challenge pair.
///
/// The verifier is 43 URL-safe characters without padding.
pub fn generate_pkce() -> AuthResult<PkcePair> {
    let verifier = URL_SAFE_NO_PAD.encode(random_bytes()?);
    let challenge = code_challenge(&verifier);
    Ok(PkcePair {
        verifier,
        challenge,
    })
}

/// Derive the `S256` code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_256_bits() {
        let state = generate_state().unwrap();
        let decoded = STANDARD.decode(&state).unwrap();
        assert_eq!(decoded.len(), RANDOM_BYTES);
        assert_eq!(state.len(), 44);
    }

    #[test]
    fn test_pkce_challenge_matches_verifier() {
        let pair = generate_pkce().unwrap();

        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.verifier.as_bytes()));
        assert_eq!(pair.challenge, expected);
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge.len(), 43);
        assert!(pair
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_rfc7636_vector() {
        // Appendix B of RFC 7636
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_successive_values_differ() {
        let first = generate_pkce().unwrap();
        let second = generate_pkce().unwrap();
        assert_ne!(first.verifier, second.verifier);
        assert_ne!(generate_state().unwrap(), generate_state().unwrap());
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let pair = generate_pkce().unwrap();
        let output = format!("{:?}", pair);
        assert!(!output.contains(&pair.verifier));
    }
}
