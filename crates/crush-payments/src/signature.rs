//! Webhook Signature Verification
//!
//! All schemes authenticate the exact bytes received. Nothing here parses
//! JSON; the body is only interpreted after `verify` succeeds.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery id in the envelope scheme
pub const HEADER_WEBHOOK_ID: &str = "webhook-id";
/// Header carrying the send timestamp in the envelope scheme
pub const HEADER_WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";
/// Signature header of the envelope and plain HMAC schemes
pub const HEADER_WEBHOOK_SIGNATURE: &str = "webhook-signature";
/// Alternate signature header of the plain HMAC scheme
pub const HEADER_DODO_SIGNATURE: &str = "x-dodo-signature";
/// Stripe signature header
pub const HEADER_STRIPE_SIGNATURE: &str = "stripe-signature";

const KNOWN_HEADERS: [&str; 5] = [
    HEADER_WEBHOOK_ID,
    HEADER_WEBHOOK_TIMESTAMP,
    HEADER_WEBHOOK_SIGNATURE,
    HEADER_DODO_SIGNATURE,
    HEADER_STRIPE_SIGNATURE,
];

/// Default replay window
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Supported signing schemes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `webhook-id` / `webhook-timestamp` / `webhook-signature: v1,<base64>`
    StandardWebhooks,

    /// Hex HMAC-SHA256 of the body in `webhook-signature` or `x-dodo-signature`
    HexHmac,

    /// `stripe-signature: t=<ts>,v1=<hex>`
    Stripe,
}

impl SignatureScheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StandardWebhooks => "standard",
            Self::HexHmac => "hmac",
            Self::Stripe => "stripe",
        }
    }
}

impl std::str::FromStr for SignatureScheme {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "standard-webhooks" | "svix" => Ok(Self::StandardWebhooks),
            "hmac" | "hex" => Ok(Self::HexHmac),
            "stripe" => Ok(Self::Stripe),
            other => Err(PaymentError::Config(format!("unknown signature scheme {other}"))),
        }
    }
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature-relevant request headers, lower-cased names
#[derive(Clone, Debug, Default)]
pub struct WebhookHeaders {
    values: HashMap<&'static str, String>,
}

impl WebhookHeaders {
    /// Collect the known headers through a lookup function
    pub fn from_lookup<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let values = KNOWN_HEADERS
            .into_iter()
            .filter_map(|name| lookup(name).map(|v| (name, v.trim().to_string())))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Self { values }
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Provider delivery id, when the scheme carries one
    pub fn delivery_id(&self) -> Option<&str> {
        self.get(HEADER_WEBHOOK_ID)
    }

    pub fn has_signature(&self) -> bool {
        [HEADER_WEBHOOK_SIGNATURE, HEADER_DODO_SIGNATURE, HEADER_STRIPE_SIGNATURE]
            .iter()
            .any(|h| self.values.contains_key(h))
    }
}

/// Shared-secret webhook verifier. Fails closed when no secret is configured.
#[derive(Clone)]
pub struct WebhookVerifier {
    scheme: SignatureScheme,
    key: Option<Vec<u8>>,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("scheme", &self.scheme)
            .field("configured", &self.key.is_some())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(scheme: SignatureScheme, secret: Option<&str>) -> Result<Self> {
        let key = match secret.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(secret) => Some(match (scheme, secret.strip_prefix("whsec_")) {
                (SignatureScheme::StandardWebhooks, Some(encoded)) => BASE64
                    .decode(encoded)
                    .map_err(|e| PaymentError::Config(format!("webhook secret is not base64: {e}")))?,
                _ => secret.as_bytes().to_vec(),
            }),
        };

        Ok(Self {
            scheme,
            key,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub const fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub const fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Verify against the current time
    pub fn verify(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
        self.verify_at(headers, body, Utc::now())
    }

    /// Verify against an explicit clock
    pub fn verify_at(&self, headers: &WebhookHeaders, body: &[u8], now: DateTime<Utc>) -> Result<()> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| rejected("webhook secret not configured"))?;

        match self.scheme {
            SignatureScheme::HexHmac => verify_hex_hmac(key, headers, body),
            SignatureScheme::StandardWebhooks => {
                self.verify_standard(key, headers, body, now)
            }
            SignatureScheme::Stripe => self.verify_stripe(key, headers, body, now),
        }
    }

    fn verify_standard(
        &self,
        key: &[u8],
        headers: &WebhookHeaders,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let id = headers
            .get(HEADER_WEBHOOK_ID)
            .ok_or_else(|| rejected("missing webhook-id"))?;
        let timestamp = headers
            .get(HEADER_WEBHOOK_TIMESTAMP)
            .ok_or_else(|| rejected("missing webhook-timestamp"))?;
        let signatures = headers
            .get(HEADER_WEBHOOK_SIGNATURE)
            .ok_or_else(|| rejected("missing webhook-signature"))?;

        self.check_timestamp(timestamp, now)?;

        let mut mac = new_mac(key)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        // Space-separated list; several entries during secret rotation
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, encoded)| BASE64.decode(encoded).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(rejected("signature mismatch"))
        }
    }

    fn verify_stripe(
        &self,
        key: &[u8],
        headers: &WebhookHeaders,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let header = headers
            .get(HEADER_STRIPE_SIGNATURE)
            .ok_or_else(|| rejected("missing stripe-signature"))?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| rejected("stripe-signature has no timestamp"))?;
        if candidates.is_empty() {
            return Err(rejected("stripe-signature has no v1 signature"));
        }

        self.check_timestamp(timestamp, now)?;

        let mut mac = new_mac(key)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        let matched = candidates
            .into_iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(rejected("signature mismatch"))
        }
    }

    fn check_timestamp(&self, raw: &str, now: DateTime<Utc>) -> Result<()> {
        let sent: i64 = raw
            .parse()
            .map_err(|_| rejected("timestamp is not an integer"))?;
        let skew = now.timestamp().abs_diff(sent);
        if skew > self.tolerance.as_secs() {
            return Err(rejected("timestamp outside tolerance"));
        }
        Ok(())
    }
}

fn verify_hex_hmac(key: &[u8], headers: &WebhookHeaders, body: &[u8]) -> Result<()> {
    let signature = headers
        .get(HEADER_WEBHOOK_SIGNATURE)
        .or_else(|| headers.get(HEADER_DODO_SIGNATURE))
        .ok_or_else(|| rejected("missing signature header"))?;

    let expected = hex::decode(signature).map_err(|_| rejected("signature is not hex"))?;

    let mut mac = new_mac(key)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| rejected("signature mismatch"))
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| PaymentError::Config(format!("hmac key: {e}")))
}

fn rejected(reason: &str) -> PaymentError {
    PaymentError::WebhookSignature(reason.to_string())
}

/// Sign a payload the way a provider would. Used by tests and local tooling.
pub fn sign(
    scheme: SignatureScheme,
    secret: &str,
    id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<WebhookHeaders> {
    let verifier = WebhookVerifier::new(scheme, Some(secret))?;
    let key = verifier
        .key
        .ok_or_else(|| PaymentError::Config("empty webhook secret".into()))?;
    let mut mac = new_mac(&key)?;
    let ts = timestamp.to_string();

    let headers = match scheme {
        SignatureScheme::HexHmac => {
            mac.update(body);
            WebhookHeaders::default().with(
                HEADER_WEBHOOK_SIGNATURE,
                hex::encode(mac.finalize().into_bytes()),
            )
        }
        SignatureScheme::StandardWebhooks => {
            mac.update(format!("{id}.{ts}.").as_bytes());
            mac.update(body);
            let sig = BASE64.encode(mac.finalize().into_bytes());
            WebhookHeaders::default()
                .with(HEADER_WEBHOOK_ID, id)
                .with(HEADER_WEBHOOK_TIMESTAMP, ts)
                .with(HEADER_WEBHOOK_SIGNATURE, format!("v1,{sig}"))
        }
        SignatureScheme::Stripe => {
            mac.update(format!("{ts}.").as_bytes());
            mac.update(body);
            let sig = hex::encode(mac.finalize().into_bytes());
            WebhookHeaders::default().with(HEADER_STRIPE_SIGNATURE, format!("t={ts},v1={sig}"))
        }
    };

    Ok(headers)
}
