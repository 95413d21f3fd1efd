//! Anti-forgery tokens
//!
//! A token is `<issued-at>.<nonce>.<digest>` where the digest is an
//! HMAC-SHA256 of the issue time and nonce keyed by the secret. Each page load
//! gets a fresh one.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

pub const TOKEN_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

/// Tolerated clock skew for tokens stamped slightly in the future
const MAX_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Missing,
    Malformed,
    Expired,
    BadSignature,
}

pub struct TokenIssuer {
    mac: HmacSha256,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())
                .expect("HMAC accepts keys of any length"),
            lifetime: TOKEN_LIFETIME,
        }
    }

    /// Secret from configuration, or a random one valid for this process only
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret),
            None => Self::new(format!(
                "{}{}",
                Uuid::new_v4().simple(),
                Uuid::new_v4().simple()
            )),
        }
    }

    pub fn issue(&self) -> String {
        self.issue_at(Utc::now().timestamp())
    }

    fn issue_at(&self, issued_at: i64) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let digest = self.keyed(issued_at, &nonce).finalize().into_bytes();
        format!("{}.{}.{}", issued_at, nonce, hex::encode(digest))
    }

    pub fn verify(&self, token: Option<&str>) -> Result<(), TokenError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let token = token.ok_or(TokenError::Missing)?;

        let mut parts = token.splitn(3, '.');
        let (Some(issued_at), Some(nonce), Some(digest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        let issued_at: i64 = issued_at.parse().map_err(|_| TokenError::Malformed)?;
        if nonce.is_empty() {
            return Err(TokenError::Malformed);
        }
        let digest = hex::decode(digest).map_err(|_| TokenError::Malformed)?;

        let age = Utc::now().timestamp() - issued_at;
        if age < -MAX_SKEW_SECS || age > self.lifetime.as_secs() as i64 {
            return Err(TokenError::Expired);
        }

        self.keyed(issued_at, nonce)
            .verify_slice(&digest)
            .map_err(|_| TokenError::BadSignature)
    }

    fn keyed(&self, issued_at: i64, nonce: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(issued_at.to_string().as_bytes());
        mac.update(b".");
        mac.update(nonce.as_bytes());
        mac
    }
}
