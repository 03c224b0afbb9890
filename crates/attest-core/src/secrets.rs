//! `SecretProvider` implementations.

use tracing::debug;

use attest_crypto::SigningSecret;

use crate::traits::SecretProvider;

/// A secret fixed at construction time.
#[derive(Debug, Clone)]
pub struct StaticSecret(SigningSecret);

impl StaticSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(SigningSecret::new(bytes))
    }
}

impl SecretProvider for StaticSecret {
    fn signing_secret(&self) -> Option<SigningSecret> {
        Some(self.0.clone()).filter(|s| !s.is_empty())
    }
}

/// No secret configured. Critical actions cannot be recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecret;

impl SecretProvider for NoSecret {
    fn signing_secret(&self) -> Option<SigningSecret> {
        None
    }
}

/// Reads the secret from an environment variable on every call, so a
/// rotated key is picked up without a restart.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    var: String,
}

impl EnvSecretProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl SecretProvider for EnvSecretProvider {
    fn signing_secret(&self) -> Option<SigningSecret> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Some(SigningSecret::new(value.into_bytes())),
            _ => {
                debug!(var = %self.var, "signing secret not set");
                None
            }
        }
    }
}
