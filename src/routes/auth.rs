use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::routes::AppState;

/// Claims of tokens issued by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized().json(ErrorResponse {
            error: "unauthorized".to_string(),
            message: self.to_string(),
            status_code: 401,
        })
    }
}

/// Verifies HS256 bearer tokens; issuing them happens elsewhere
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// The token's subject, i.e. the caller's user id
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims.sub)
    }
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AuthError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or(AuthError::MissingToken)?;

    let id = state.jwt.verify(token)?;
    Ok(AuthUser { id })
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map_err(|e| {
            tracing::debug!("Rejected request to {}: {}", req.path(), e);
            e.into()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_an_hour() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_verify_reads_subject() {
        let verifier = JwtVerifier::new("secret");
        let sub = verifier.verify(&token("secret", "user-1", in_an_hour())).unwrap();
        assert_eq!(sub, "user-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new("secret");
        let result = verifier.verify(&token("other", "user-1", in_an_hour()));
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new("secret");
        let expired = (chrono::Utc::now().timestamp() - 3600) as usize;
        assert!(verifier.verify(&token("secret", "user-1", expired)).is_err());
    }
}
