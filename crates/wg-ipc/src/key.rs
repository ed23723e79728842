//! WireGuard key helpers.
//!
//! Keys are opaque 32-byte values. The only cryptography performed here is
//! deriving a public key from a private key; everything else is encoding.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Size of a WireGuard key in bytes.
pub const WG_KEY_LEN: usize = 32;

/// Length of a key in lowercase hex.
pub const WG_KEY_LEN_HEX: usize = WG_KEY_LEN * 2;

/// A raw WireGuard key.
pub type Key = [u8; WG_KEY_LEN];

/// Encode a key as 64 lowercase hex characters.
pub fn to_hex(key: &Key) -> String {
    hex::encode(key)
}

/// Decode a key from exactly 64 hex characters.
///
/// Both cases are accepted; anything else is a protocol error.
pub fn from_hex(s: &str) -> Result<Key> {
    if s.len() != WG_KEY_LEN_HEX {
        return Err(Error::protocol(format!(
            "key must be {} hex characters, got {}",
            WG_KEY_LEN_HEX,
            s.len()
        )));
    }
    let mut key = [0u8; WG_KEY_LEN];
    hex::decode_to_slice(s, &mut key)
        .map_err(|e| Error::protocol(format!("invalid hex key: {}", e)))?;
    Ok(key)
}

/// Check whether a key is all zeros.
///
/// Runs in constant time with respect to the key contents.
pub fn is_zero(key: &Key) -> bool {
    key.iter().fold(0u8, |acc, &b| acc | b) == 0
}

/// Derive the public key for a private key (X25519 with the base point).
pub fn public_from_private(private: &Key) -> Key {
    let secret = StaticSecret::from(*private);
    PublicKey::from(&secret).to_bytes()
}

/// Copy a 32-byte key out of a payload that must be exactly key-sized.
pub(crate) fn from_slice(data: &[u8]) -> Option<Key> {
    <Key>::try_from(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8 * 7;
        }
        let encoded = to_hex(&key);
        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[..6], "00070e");
        assert_eq!(from_hex(&encoded).unwrap(), key);
        assert_eq!(from_hex(&encoded.to_uppercase()).unwrap(), key);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(from_hex("abcd").unwrap_err().is_protocol());
        let bad = "zz".repeat(32);
        assert!(from_hex(&bad).unwrap_err().is_protocol());
        let long = "00".repeat(33);
        assert!(from_hex(&long).is_err());
    }

    #[test]
    fn test_is_zero() {
        assert!(is_zero(&[0u8; 32]));
        let mut key = [0u8; 32];
        key[31] = 1;
        assert!(!is_zero(&key));
    }

    #[test]
    fn test_public_from_private_rfc7748() {
        // RFC 7748 section 6.1, Alice's key pair.
        let private =
            from_hex("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a").unwrap();
        let public = public_from_private(&private);
        assert_eq!(
            to_hex(&public),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
    }

    #[test]
    fn test_from_slice_exact_length() {
        assert!(from_slice(&[1u8; 32]).is_some());
        assert!(from_slice(&[1u8; 31]).is_none());
        assert!(from_slice(&[1u8; 33]).is_none());
    }
}
