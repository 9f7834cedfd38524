use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT Claims structure.
///
/// Tokens are issued by the identity service; this engine only verifies them
/// and reads the participant id and role.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Username
    pub uid: i32,    // User ID
    pub role: String,
    pub exp: usize, // Expiration timestamp
}

/// Sign a new JWT token for a user. Used by tests and local tooling; the
/// production issuer lives in the identity service.
pub fn sign(secret: &str, user_id: i32, username: &str, role: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(7))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: username.to_owned(),
        uid: user_id,
        role: role.to_owned(),
        exp: expiration as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify and decode a JWT token.
pub fn verify(secret: &str, token: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let token = sign("test-secret", 7, "mdupont", "teacher").unwrap();
        let claims = verify("test-secret", &token).unwrap();
        assert_eq!(claims.uid, 7);
        assert_eq!(claims.sub, "mdupont");
        assert_eq!(claims.role, "teacher");
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = sign("secret-a", 1, "alice", "student").unwrap();
        assert!(verify("secret-b", &token).is_err());
    }
}
