use crate::error::{ClientError, Result};
use base64::Engine as _;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// GitHub caps app JWTs at ten minutes.
pub const APP_JWT_TTL_SECS: u64 = 600;

/// Credentials of a GitHub App: its client id and RSA signing key.
#[derive(Clone)]
pub struct GithubApp {
    client_id: String,
    key: EncodingKey,
}

impl std::fmt::Debug for GithubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubApp")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AppClaims<'a> {
    iat: u64,
    exp: u64,
    iss: &'a str,
}

impl GithubApp {
    pub fn new(client_id: impl Into<String>, private_key_pem: &[u8]) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "GitHub App client id must be non-empty".to_string(),
            ));
        }
        let key = EncodingKey::from_rsa_pem(private_key_pem).map_err(|err| {
            ClientError::InvalidConfig(format!("GitHub App private key is not an RSA PEM: {err}"))
        })?;
        Ok(Self { client_id, key })
    }

    /// Private key given as base64 of the PEM file, as it is kept in environment variables.
    pub fn from_base64_key(client_id: impl Into<String>, encoded: &str) -> Result<Self> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let pem = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|err| {
                ClientError::InvalidConfig(format!("GitHub App private key is not base64: {err}"))
            })?;
        Self::new(client_id, &pem)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// RS256 app JWT valid from now for [`APP_JWT_TTL_SECS`].
    pub fn jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ClientError::InvalidConfig(format!("system clock is before 1970: {err}")))?
            .as_secs();
        self.jwt_at(now)
    }

    pub fn jwt_at(&self, now: u64) -> Result<String> {
        let claims = AppClaims {
            iat: now,
            exp: now + APP_JWT_TTL_SECS,
            iss: &self.client_id,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|err| ClientError::InvalidConfig(format!("failed to sign GitHub App JWT: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_credentials() {
        assert!(GithubApp::new("  ", b"irrelevant").is_err());
        assert!(GithubApp::new("Iv1.app", b"not a pem").is_err());
        assert!(GithubApp::from_base64_key("Iv1.app", "%%%").is_err());
    }
}
