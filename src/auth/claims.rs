use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::UserIdentity;

/// JWT payload carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Uuid,     // user ID
    pub email: String, // login email at issuance
    pub iat: usize,    // issued at (unix timestamp)
    pub exp: usize,    // expires at (unix timestamp)
    pub iss: String,   // issuer
    pub aud: String,   // audience
}

impl SessionClaims {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.sub,
            email: self.email.clone(),
        }
    }
}
