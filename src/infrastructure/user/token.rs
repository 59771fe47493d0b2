//! Confirmation token generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Generator for URL-safe random tokens
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    /// Number of random bytes per token
    token_bytes: usize,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self { token_bytes: 32 }
    }
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes;
        self
    }

    pub fn generate(&self) -> String {
        let mut random_bytes = vec![0u8; self.token_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        URL_SAFE_NO_PAD.encode(&random_bytes)
    }
}
