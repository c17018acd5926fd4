use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::{AuthSession, SessionEvent};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // auth_id
    pub email: String,
    pub jti: Uuid,       // one id per issued token, used for revocation
    pub exp: i64,        // expiration timestamp
}

/// A token taken out of service before its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub jti: Uuid,
    pub auth_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Issues, verifies and revokes session tokens, and broadcasts session changes.
/// Shared by both identity adapters.
pub struct TokenIssuer {
    secret: String,
    ttl: Duration,
    // jti -> exp of tokens signed out before they expired
    revoked: RwLock<HashMap<Uuid, i64>>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            secret: secret.into(),
            ttl: Duration::hours(ttl_hours),
            revoked: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn issue(&self, auth_id: Uuid, email: &str) -> Result<AuthSession, AppError> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Unauthorized("failed to calculate expiration".into()))?;

        let claims = Claims {
            sub: auth_id,
            email: email.to_string(),
            jti: Uuid::new_v4(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Unauthorized(format!("failed to generate token: {}", e)))?;

        let _ = self.events.send(SessionEvent::SignedIn { auth_id });

        Ok(AuthSession {
            token,
            auth_id,
            email: claims.email,
            expires_at: timestamp_to_utc(claims.exp),
        })
    }

    /// Decodes a token; None when forged, expired or revoked
    pub fn verify(&self, token: &str) -> Option<AuthSession> {
        let claims = self.decode(token)?;
        let revoked = self.revoked.read().unwrap_or_else(PoisonError::into_inner);
        if revoked.contains_key(&claims.jti) {
            return None;
        }
        Some(AuthSession {
            token: token.to_string(),
            auth_id: claims.sub,
            email: claims.email,
            expires_at: timestamp_to_utc(claims.exp),
        })
    }

    /// Revokes a token; returns what was revoked, None when the token was
    /// already invalid
    pub fn revoke(&self, token: &str) -> Option<Revocation> {
        let claims = self.decode(token)?;
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, exp| *exp >= now);
        if revoked.insert(claims.jti, claims.exp).is_some() {
            return None;
        }
        drop(revoked);

        let _ = self.events.send(SessionEvent::SignedOut { auth_id: claims.sub });
        Some(Revocation {
            jti: claims.jti,
            auth_id: claims.sub,
            expires_at: timestamp_to_utc(claims.exp),
        })
    }

    /// Reloads revocations kept by a previous process. Expired ones are skipped.
    /// No events are sent.
    pub fn restore(&self, revocations: impl IntoIterator<Item = Revocation>) -> usize {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        let before = revoked.len();
        for revocation in revocations {
            let exp = revocation.expires_at.timestamp();
            if exp >= now {
                revoked.insert(revocation.jti, exp);
            }
        }
        revoked.len() - before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn decode(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| tracing::debug!(error = %e, "rejected session token"))
        .ok()
    }
}

fn timestamp_to_utc(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp, 0).single().unwrap_or_else(Utc::now)
}
