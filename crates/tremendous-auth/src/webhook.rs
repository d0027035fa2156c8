//! Webhook signature verification
//!
//! Deliveries carry `Tremendous-Webhook-Signature: sha256=<hexdigest>`, the
//! hex HMAC-SHA256 of the raw request body keyed by the shared secret.
//! Verification borrows the body bytes and never consumes them, so the caller
//! can hand the same bytes to whatever decodes the event afterwards.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::constants::SIGNATURE_ALGORITHM;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// A parsed `algorithm=digest` signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature {
    pub algorithm: String,
    pub digest_hex: String,
}

/// Split a header value on the first `=`.
///
/// Fails with `InvalidAlgorithm` when there is no `=` or the algorithm is
/// anything other than `sha256`.
pub fn parse_signature(header: &str) -> Result<WebhookSignature> {
    let (algorithm, digest) = header.split_once('=').ok_or(Error::InvalidAlgorithm)?;
    if algorithm != SIGNATURE_ALGORITHM {
        return Err(Error::InvalidAlgorithm);
    }
    Ok(WebhookSignature {
        algorithm: algorithm.to_string(),
        digest_hex: digest.to_string(),
    })
}

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `signature_header` against the raw body.
///
/// `Ok(false)` means the header was well formed but the digest did not match.
pub fn verify(signature_header: &str, body: &[u8], secret: &[u8]) -> Result<bool> {
    let signature = parse_signature(signature_header)?;
    let expected = compute_signature(secret, body);
    Ok(expected
        .as_bytes()
        .ct_eq(signature.digest_hex.as_bytes())
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_secret";
    const BODY: &[u8] = br#"{"event":"REWARDS.DELIVERY.SUCCEEDED","uuid":"abc"}"#;

    fn header_for(body: &[u8], secret: &[u8]) -> String {
        format!("sha256={}", compute_signature(secret, body))
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let digest = compute_signature(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn valid_signature_verifies() {
        assert!(verify(&header_for(BODY, SECRET), BODY, SECRET).unwrap());
    }

    #[test]
    fn mutated_body_fails() {
        let header = header_for(BODY, SECRET);
        for i in 0..BODY.len() {
            let mut body = BODY.to_vec();
            body[i] ^= 0x01;
            assert!(!verify(&header, &body, SECRET).unwrap(), "byte {i}");
        }
    }

    #[test]
    fn mutated_digest_fails() {
        let header = header_for(BODY, SECRET);
        let mut bytes = header.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let header = String::from_utf8(bytes).unwrap();
        assert!(!verify(&header, BODY, SECRET).unwrap());
    }

    #[test]
    fn wrong_secret_fails() {
        let header = header_for(BODY, b"another_secret");
        assert!(!verify(&header, BODY, SECRET).unwrap());
    }

    #[test]
    fn truncated_digest_fails() {
        let header = header_for(BODY, SECRET);
        assert!(!verify(&header[..header.len() - 2], BODY, SECRET).unwrap());
    }

    #[test]
    fn empty_digest_fails() {
        assert!(!verify("sha256=", BODY, SECRET).unwrap());
    }

    #[test]
    fn sha1_is_invalid_algorithm() {
        let err = verify("sha1=abcdef", BODY, SECRET).unwrap_err();
        assert!(matches!(err, Error::InvalidAlgorithm));
    }

    #[test]
    fn missing_separator_is_invalid_algorithm() {
        let err = verify("sha256abcdef", BODY, SECRET).unwrap_err();
        assert!(matches!(err, Error::InvalidAlgorithm));
        let err = verify("", BODY, SECRET).unwrap_err();
        assert!(matches!(err, Error::InvalidAlgorithm));
    }

    #[test]
    fn algorithm_match_is_exact() {
        assert!(parse_signature("SHA256=abc").is_err());
        assert!(parse_signature(" sha256=abc").is_err());
    }

    #[test]
    fn split_happens_on_first_equals() {
        let signature = parse_signature("sha256=ab=cd").unwrap();
        assert_eq!(signature.algorithm, "sha256");
        assert_eq!(signature.digest_hex, "ab=cd");
    }

    #[test]
    fn verification_leaves_body_untouched() {
        let body = BODY.to_vec();
        let header = header_for(&body, SECRET);
        assert!(verify(&header, &body, SECRET).unwrap());
        assert_eq!(body, BODY);
        // Same bytes verify again
        assert!(verify(&header, &body, SECRET).unwrap());
    }
}
