//! Owner Session Tokens
//!
//! Identity comes from an upstream auth collaborator as a signed bearer token
//! of the form `<ownerId>.<hex hmac-sha256(secret, ownerId)>`.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crush_core::OwnerId;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies owner session tokens
pub struct SessionTokens {
    key: HmacSha256,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens").finish_non_exhaustive()
    }
}

impl SessionTokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            key: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    fn mac(&self, owner: &str) -> HmacSha256 {
        self.key.clone().chain_update(owner.as_bytes())
    }

    /// Mint a token for `owner`
    pub fn issue(&self, owner: &OwnerId) -> String {
        let tag = self.mac(owner.as_str()).finalize().into_bytes();
        format!("{}.{}", owner, hex::encode(tag))
    }

    /// Verify a token and return the owner it names
    pub fn verify(&self, token: &str) -> Option<OwnerId> {
        let (owner, tag) = token.trim().rsplit_once('.')?;
        if owner.is_empty() {
            return None;
        }
        let tag = hex::decode(tag).ok()?;
        self.mac(owner).verify_slice(&tag).ok()?;
        Some(OwnerId::from_string(owner))
    }
}

/// Authenticated owner extracted from `Authorization: Bearer <token>`
#[derive(Clone, Debug)]
pub struct Owner(pub OwnerId);

impl FromRequestParts<AppState> for Owner {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match token.and_then(|t| state.sessions.verify(t)) {
            Some(owner) => Ok(Self(owner)),
            None => {
                tracing::warn!(path = %parts.uri.path(), "Rejected unauthenticated request");
                Err((
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("Sign in to continue.", "UNAUTHORIZED")),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let tokens = SessionTokens::new("session-secret").unwrap();
        let owner = OwnerId::from_string("user.with.dots");
        let token = tokens.issue(&owner);
        assert_eq!(tokens.verify(&token), Some(owner));
    }

    #[test]
    fn test_rejects_forged_tokens() {
        let tokens = SessionTokens::new("session-secret").unwrap();
        let other = SessionTokens::new("another-secret").unwrap();
        let forged = other.issue(&OwnerId::from_string("user-1"));

        assert!(tokens.verify(&forged).is_none());
        assert!(tokens.verify("user-1").is_none());
        assert!(tokens.verify("user-1.zz").is_none());
        assert!(tokens.verify(".abcd").is_none());

        // Swapping the owner keeps the tag but breaks the binding
        let good = tokens.issue(&OwnerId::from_string("user-1"));
        let (_, tag) = good.rsplit_once('.').unwrap();
        assert!(tokens.verify(&format!("user-2.{tag}")).is_none());
    }
}
