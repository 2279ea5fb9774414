use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;

use super::{Claims, Identity, SessionVerifier};

/// Verifies HS256 tokens signed with the configured secret.
pub struct JwtSessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, token: &str) -> Option<Identity> {
        match self.decode_claims(token) {
            Ok(claims) => Some(Identity {
                user_id: claims.sub,
                username: claims.username,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                None
            }
        }
    }
}
