//! At-rest encryption.
//!
//! The cipher key is the SHA-256 digest of the passphrase concatenated
//! with the salt. Encryption and decryption run block-wise over 16-byte
//! blocks; the final partial block is zero-padded and trailing zero bytes
//! are trimmed from the output in both directions. This layout is kept
//! byte-compatible with databases written by earlier versions of the
//! store, which also means it is unauthenticated and deterministic per
//! block. Document payloads are JSON text and never end in a zero byte,
//! so the trimming is lossless for them.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};

use crate::error::{DbError, DbResult};

const BLOCK_SIZE: usize = 16;

/// Symmetric block codec for document files
pub struct Codec {
    cipher: Option<Aes256>,
}

impl Codec {
    /// Build a codec from the configured passphrase and salt.
    ///
    /// Encryption is disabled when both are empty.
    pub fn new(encryption_key: &str, salt: &str) -> DbResult<Self> {
        if encryption_key.is_empty() && salt.is_empty() {
            return Ok(Self { cipher: None });
        }

        let mut hasher = Sha256::new();
        hasher.update(encryption_key.as_bytes());
        hasher.update(salt.as_bytes());
        let key = hasher.finalize();

        let cipher = Aes256::new_from_slice(key.as_slice())
            .map_err(|e| DbError::Codec(format!("unable to create cipher: {e}")))?;

        Ok(Self {
            cipher: Some(cipher),
        })
    }

    /// Whether documents are encrypted on disk
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt a buffer; pass-through when encryption is disabled
    pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        match &self.cipher {
            Some(cipher) => Self::apply(data, |block| cipher.encrypt_block(block)),
            None => data.to_vec(),
        }
    }

    /// Decrypt a buffer; pass-through when encryption is disabled
    pub fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        match &self.cipher {
            Some(cipher) => Self::apply(data, |block| cipher.decrypt_block(block)),
            None => data.to_vec(),
        }
    }

    fn apply<F>(data: &[u8], mut transform: F) -> Vec<u8>
    where
        F: FnMut(&mut GenericArray<u8, aes::cipher::consts::U16>),
    {
        let mut out = Vec::with_capacity(data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE);

        for chunk in data.chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            let block = GenericArray::from_mut_slice(&mut block);
            transform(block);
            out.extend_from_slice(block.as_slice());
        }

        // Trailing zero bytes are padding, not content.
        while out.last() == Some(&0) {
            out.pop();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> Codec {
        Codec::new("0123456789abcdef0123456789abcdef", "pepper").unwrap()
    }

    #[test]
    fn test_disabled_when_both_empty() {
        let codec = Codec::new("", "").unwrap();
        assert!(!codec.is_enabled());
        assert_eq!(codec.encrypt(b"plain"), b"plain");
        assert_eq!(codec.decrypt(b"plain"), b"plain");
    }

    #[test]
    fn test_enabled_with_salt_only() {
        let codec = Codec::new("", "just-a-salt").unwrap();
        assert!(codec.is_enabled());
    }

    #[test]
    fn test_round_trip_various_lengths() {
        let codec = codec();
        for payload in [
            &b"x"[..],
            b"fifteen bytes..",
            b"exactly sixteen.",
            b"{\n\t\"String\": \"test1\",\n\t\"Number\": 1\n}",
        ] {
            let ct = codec.encrypt(payload);
            assert_ne!(ct, payload);
            assert_eq!(codec.decrypt(&ct), payload);
        }
    }

    #[test]
    fn test_empty_input() {
        let codec = codec();
        assert_eq!(codec.encrypt(b""), b"");
        assert_eq!(codec.decrypt(b""), b"");
    }

    #[test]
    fn test_deterministic() {
        let codec = codec();
        assert_eq!(codec.encrypt(b"same input"), codec.encrypt(b"same input"));
    }

    #[test]
    fn test_key_and_salt_both_matter() {
        let base = codec();
        let other_key = Codec::new("another-passphrase-entirely!!!!!", "pepper").unwrap();
        let other_salt = Codec::new("0123456789abcdef0123456789abcdef", "sugar").unwrap();

        let ct = base.encrypt(b"some document bytes");
        assert_ne!(other_key.encrypt(b"some document bytes"), ct);
        assert_ne!(other_salt.encrypt(b"some document bytes"), ct);
    }

    #[test]
    fn test_wrong_key_does_not_round_trip() {
        let ct = codec().encrypt(b"{\"Number\": 4}");
        let wrong = Codec::new("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz", "pepper").unwrap();
        assert_ne!(wrong.decrypt(&ct), b"{\"Number\": 4}");
    }
}
