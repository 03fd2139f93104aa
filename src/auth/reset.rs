use rand::RngCore;
use sha2::{Digest, Sha256};

/// A one-time password reset token. Only `digest` is ever persisted; the
/// plaintext travels to the user by email.
pub struct ResetToken {
    pub plaintext: String,
    pub digest: String,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let digest = digest(&plaintext);
        Self { plaintext, digest }
    }
}

/// Reset tokens are high-entropy random values, so a fast hash is sufficient.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
