use crate::errors::TaskError;
use base64::Engine;
use sha2::{Digest, Sha256};

pub fn parse_public_key_tokens(line: &str) -> Result<(String, String), TaskError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(TaskError::invalid("public key has invalid format")
            .with_hint("Expected: \"<type> <base64> [comment]\"."));
    }
    Ok((tokens[0].to_string(), tokens[1].to_string()))
}

/// SHA-256 fingerprint of a public key line, hashed over the decoded key blob
/// (falls back to the raw token when the blob is not valid base64).
pub fn fingerprint_public_key_sha256(line: &str) -> Result<String, TaskError> {
    let (_, key_blob) = parse_public_key_tokens(line)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(key_blob.as_bytes())
        .unwrap_or_else(|_| key_blob.as_bytes().to_vec());
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::{fingerprint_public_key_sha256, parse_public_key_tokens};

    #[test]
    fn splits_type_and_blob() {
        let (key_type, blob) = parse_public_key_tokens("ssh-ed25519 QUFBQQ== a@b").unwrap();
        assert_eq!(key_type, "ssh-ed25519");
        assert_eq!(blob, "QUFBQQ==");
    }

    #[test]
    fn rejects_bare_token() {
        assert!(parse_public_key_tokens("ssh-ed25519").is_err());
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint_public_key_sha256("ssh-ed25519 QUFBQQ== a@b").unwrap();
        let b = fingerprint_public_key_sha256("ssh-ed25519 QUFBQQ== other@comment").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
