use serde::{Deserialize, Serialize};

/// JWT payload asserting the identity of a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub iss: String, // issuer
    pub aud: String, // audience
    pub iat: i64,    // issued at (unix timestamp)
    pub nbf: i64,    // not before
    pub exp: i64,    // expires at
}
