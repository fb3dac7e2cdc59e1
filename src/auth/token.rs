use std::str::FromStr;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::models::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: Role,
    /// Issued-at, UNIX seconds
    pub iat: i64,
    /// Expiry, UNIX seconds
    pub exp: i64,
}

fn algorithm(config: &AuthConfig) -> Result<Algorithm, jsonwebtoken::errors::Error> {
    match Algorithm::from_str(&config.jwt_algorithm)? {
        alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => Ok(alg),
        _ => Err(jsonwebtoken::errors::ErrorKind::InvalidAlgorithm.into()),
    }
}

/// Issue a signed bearer token for the given user.
pub fn issue_token(
    user_id: i64,
    role: Role,
    config: &AuthConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id,
        role,
        iat: now,
        exp: now + config.token_expiry_secs,
    };
    encode(
        &Header::new(algorithm(config)?),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verify signature and expiry. Any failure yields `None`.
pub fn verify_token(token: &str, config: &AuthConfig) -> Option<Claims> {
    let alg = algorithm(config).ok()?;
    let mut validation = Validation::new(alg);
    validation.leeway = 0;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!("Rejected token: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn issued_token_verifies_with_same_claims() {
        let config = config();
        let token = issue_token(42, Role::Admin, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, config.token_expiry_secs);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AuthConfig {
            token_expiry_secs: -10,
            ..config()
        };
        let token = issue_token(1, Role::User, &config).unwrap();
        assert!(verify_token(&token, &config).is_none());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(1, Role::User, &config()).unwrap();
        let other = AuthConfig {
            jwt_secret: "other-secret".into(),
            ..config()
        };
        assert!(verify_token(&token, &other).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_token("not.a.token", &config()).is_none());
        assert!(verify_token("", &config()).is_none());
    }

    #[test]
    fn configured_algorithm_is_used() {
        let config = AuthConfig {
            jwt_algorithm: "HS512".into(),
            ..config()
        };
        let token = issue_token(7, Role::User, &config).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS512);
        assert!(verify_token(&token, &config).is_some());

        // An HS256 verifier refuses an HS512 token
        assert!(verify_token(&token, &AuthConfig { jwt_algorithm: "HS256".into(), ..config }).is_none());
    }

    #[test]
    fn asymmetric_algorithms_are_refused() {
        let config = AuthConfig {
            jwt_algorithm: "RS256".into(),
            ..config()
        };
        assert!(issue_token(1, Role::User, &config).is_err());
    }
}
