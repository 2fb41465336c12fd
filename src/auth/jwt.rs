use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    auth::{claims::Claims, error::AuthError},
    config::JwtConfig,
    state::AppState,
};

/// Lifetime of every issued token. There is no refresh; clients sign in again.
pub const TOKEN_TTL: Duration = Duration::hours(24);

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> Result<String, AuthError> {
        let iat = now.unix_timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat,
            nbf: iat,
            exp: iat + TOKEN_TTL.whole_seconds(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AuthError::Signing
        })?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Check signature, time window and audience. A token stops being valid
    /// at its `exp` second. Every failure is `Unauthorized`.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss", "aud"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            AuthError::Unauthorized
        })?;
        if data.claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            warn!(sub = %data.claims.sub, "jwt rejected: expired");
            return Err(AuthError::Unauthorized);
        }
        debug!(sub = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    /// Validate and parse the subject back into a user id.
    pub fn subject(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.validate(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)
    }
}
