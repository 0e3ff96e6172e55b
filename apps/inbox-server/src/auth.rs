use chrono::Utc;
use inbox_types::entities::{AgentIdentity, AgentRole};
use inbox_types::AppError;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by the agent session token, issued by whatever upstream
/// identity system the organization uses and handed to this backend as a
/// bearer token (HTTP) or query-string token (socket gateway).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClaims {
    pub sub: Uuid,
    pub organization_id: Uuid,
    pub role: AgentRole,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthProvider {
    secret: String,
}

impl AuthProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn verify(&self, token: &str) -> Result<AgentIdentity, AppError> {
        let decoded = decode::<AgentClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(jsonwebtoken::Algorithm::HS256),
        )
        .map_err(|_| AppError::Authn)?;

        let claims = decoded.claims;
        if claims.exp < Utc::now().timestamp() {
            return Err(AppError::Authn);
        }

        Ok(AgentIdentity {
            user_id: claims.sub,
            organization_id: claims.organization_id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(claims: &AgentClaims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn verify_accepts_a_token_it_signed() {
        let provider = AuthProvider::new("top-secret");
        let claims = AgentClaims {
            sub: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role: AgentRole::Agent,
            exp: Utc::now().timestamp() + 3600,
        };
        let token = token_for(&claims, "top-secret");
        let identity = provider.verify(&token).unwrap();
        assert_eq!(identity.user_id, claims.sub);
    }

    #[test]
    fn verify_rejects_expired_token() {
        let provider = AuthProvider::new("top-secret");
        let claims = AgentClaims {
            sub: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role: AgentRole::Agent,
            exp: Utc::now().timestamp() - 10,
        };
        let token = token_for(&claims, "top-secret");
        assert!(provider.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_token_signed_with_wrong_secret() {
        let provider = AuthProvider::new("top-secret");
        let claims = AgentClaims {
            sub: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role: AgentRole::Agent,
            exp: Utc::now().timestamp() + 3600,
        };
        let token = token_for(&claims, "wrong-secret");
        assert!(provider.verify(&token).is_err());
    }
}
