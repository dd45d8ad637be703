//! Connection authentication.
//!
//! The publisher presents the shared secret in the `x-connection-key` header
//! of the upgrade request. The comparison runs over SHA-256 digests of both
//! values so its duration depends on neither the secret's length nor the
//! position of the first differing byte.

use crate::error::AuthError;
use axum::http::HeaderMap;
use deploy_core::protocol::CONNECTION_KEY_HEADER;
use sha2::{Digest, Sha256};

/// Check the upgrade request headers against the configured secret
pub fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
    let presented = headers
        .get(CONNECTION_KEY_HEADER)
        .ok_or(AuthError::Missing)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;

    if secrets_match(presented, expected) {
        Ok(())
    } else {
        Err(AuthError::Mismatch)
    }
}

/// Constant-time secret comparison
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());

    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_matching_secret() {
        assert_eq!(authorize(&headers_with("s3cret"), "s3cret"), Ok(()));
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(authorize(&HeaderMap::new(), "s3cret"), Err(AuthError::Missing));
    }

    #[test]
    fn test_wrong_secret() {
        assert_eq!(authorize(&headers_with("s3cre"), "s3cret"), Err(AuthError::Mismatch));
        assert_eq!(authorize(&headers_with("s3cret!"), "s3cret"), Err(AuthError::Mismatch));
        assert_eq!(authorize(&headers_with(""), "s3cret"), Err(AuthError::Mismatch));
    }

    #[test]
    fn test_non_text_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONNECTION_KEY_HEADER,
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        assert_eq!(authorize(&headers, "s3cret"), Err(AuthError::Malformed));
    }
}
