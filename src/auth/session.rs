use axum::{extract::FromRef, http::HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::claims::SessionClaims, config::SessionConfig, state::AppState, users::UserIdentity,
};

/// Signing material and cookie settings for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub max_age: Duration,
    pub update_age: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

/// A freshly signed token with its decoded form.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
    pub expires: OffsetDateTime,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.session)
    }
}

impl SessionKeys {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            max_age: Duration::seconds(cfg.max_age_secs),
            update_age: Duration::seconds(cfg.update_age_secs),
            cookie_name: cfg.cookie_name.clone(),
            cookie_secure: cfg.cookie_secure,
        }
    }

    pub fn issue(&self, identity: &UserIdentity) -> anyhow::Result<IssuedSession> {
        let now = OffsetDateTime::now_utc();
        let expires = now + self.max_age;
        let claims = SessionClaims {
            sub: identity.id,
            email: identity.email.clone(),
            iat: now.unix_timestamp() as usize,
            exp: expires.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %identity.id, "session token signed");
        Ok(IssuedSession {
            token,
            claims,
            expires,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }

    /// True once the token is older than the update age.
    pub fn needs_renewal(&self, claims: &SessionClaims) -> bool {
        let issued_at = claims.iat as i64;
        OffsetDateTime::now_utc().unix_timestamp() - issued_at >= self.update_age.whole_seconds()
    }

    pub fn session_cookie(&self, session: &IssuedSession) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), session.token.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .max_age(self.max_age)
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .max_age(Duration::ZERO)
            .build()
    }

    /// Session cookie first, then `Authorization: Bearer`.
    pub fn token_from_request(&self, cookies: &CookieJar, headers: &HeaderMap) -> Option<String> {
        if let Some(cookie) = cookies.get(&self.cookie_name) {
            if !cookie.value().is_empty() {
                return Some(cookie.value().to_string());
            }
        }

        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// Decodes whatever token the request carries; invalid tokens count as absent.
    pub fn claims_from_request(
        &self,
        cookies: &CookieJar,
        headers: &HeaderMap,
    ) -> Option<SessionClaims> {
        let token = self.token_from_request(cookies, headers)?;
        match self.verify(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "ignoring invalid session token");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config(secret: &str) -> SessionConfig {
    SessionConfig {
        secret: secret.into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        max_age_secs: 30 * 24 * 60 * 60,
        update_age_secs: 24 * 60 * 60,
        cookie_name: "session-token".into(),
        cookie_secure: false,
    }
}
