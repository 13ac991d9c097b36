use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::Result;
use crate::models::user::{Claims, User};

pub fn issue(user: &User, secret: &str, expire_hours: i64) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_hex(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(expire_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn teacher() -> User {
        User::new(
            "Rina".into(),
            "rina@example.com".into(),
            "hash".into(),
            Role::Teacher,
        )
    }

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let user = teacher();
        let token = issue(&user, "s3cret", 1).unwrap();
        let claims = verify(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, user.id.to_hex());
        assert_eq!(claims.role, Role::Teacher);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue(&teacher(), "s3cret", 1).unwrap();
        assert!(verify(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue(&teacher(), "s3cret", -2).unwrap();
        assert!(verify(&token, "s3cret").is_err());
    }
}
