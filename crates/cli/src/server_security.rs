use anyhow::{Context as AnyhowContext, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::SocketAddr;

use crate::config::WEBHOOK_SECRET_ENV;

pub(crate) const SIGNATURE_HEADER: &str = "x-hub-signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Shared secret GitHub signs webhook deliveries with.
#[derive(Clone)]
pub(crate) struct WebhookSecret {
    secret: String,
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

impl WebhookSecret {
    pub(crate) fn parse(raw: Option<&str>) -> Result<Option<Self>> {
        let Some(raw) = raw else {
            return Ok(None);
        };

        let secret = raw.trim();
        if secret.is_empty() {
            anyhow::bail!("webhook secret must be non-empty")
        }

        Ok(Some(Self {
            secret: secret.to_string(),
        }))
    }

    /// Check a `sha256=<hex>` signature header against `body`.
    pub(crate) fn verify(&self, body: &[u8], header_value: &str) -> bool {
        let Some(signature) = header_value.trim().strip_prefix("sha256=") else {
            return false;
        };
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        // verify_slice compares in constant time.
        mac.verify_slice(&expected).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn sign(&self, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }
}

/// Resolve `bind`; non-loopback addresses need `public`, and `public` needs a secret.
pub(crate) async fn resolve_guarded_bind_addrs(
    bind: &str,
    public: bool,
    secret: Option<&WebhookSecret>,
) -> Result<Vec<SocketAddr>> {
    if public && secret.is_none() {
        anyhow::bail!(
            "Refusing to serve with --public without a webhook secret. Set {WEBHOOK_SECRET_ENV}."
        )
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();
    if addrs.is_empty() {
        anyhow::bail!("Bind address resolved to no socket addresses: {bind}")
    }

    if !public {
        if let Some(exposed) = addrs.iter().find(|addr| !addr.ip().is_loopback()) {
            anyhow::bail!(
                "Refusing to bind to non-loopback address without --public: {bind} ({exposed}). Pass --public and set {WEBHOOK_SECRET_ENV} to expose the webhook."
            )
        }
    }
    Ok(addrs)
}

/// IPv4 first, so `localhost` does not end up on `::1` only.
pub(crate) fn choose_preferred_bind_addr(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}
