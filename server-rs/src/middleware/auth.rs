use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Role;
use crate::services::admission::Actor;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    #[serde(rename = "type")]
    pub token_type: String, // "access" or "refresh"
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            role: self.role,
        }
    }
}

pub fn generate_tokens(
    user_id: Uuid,
    role: Role,
    secret: &str,
    access_expiry_secs: i64,
    refresh_expiry_secs: i64,
) -> AppResult<(String, String)> {
    let now = Utc::now().timestamp();
    let key = EncodingKey::from_secret(secret.as_bytes());

    let access_claims = Claims {
        sub: user_id.to_string(),
        role,
        token_type: "access".to_string(),
        exp: now + access_expiry_secs,
        iat: now,
    };
    let access_token = encode(&Header::default(), &access_claims, &key)?;

    let refresh_claims = Claims {
        token_type: "refresh".to_string(),
        exp: now + refresh_expiry_secs,
        ..access_claims
    };
    let refresh_token = encode(&Header::default(), &refresh_claims, &key)?;

    Ok((access_token, refresh_token))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware: requires a valid access token. Sets AuthUser in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(&req)
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let claims = verify_token(&token, &state.config.jwt.secret)?;

    if claims.token_type != "access" {
        return Err(AppError::Unauthorized("Access token required".into()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))?;

    req.extensions_mut().insert(AuthUser {
        id: user_id,
        role: claims.role,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_tokens_verify_with_their_type() {
        let id = Uuid::new_v4();
        let (access, refresh) =
            generate_tokens(id, Role::FacilityOwner, SECRET, 3600, 86400).unwrap();

        let a = verify_token(&access, SECRET).unwrap();
        assert_eq!(a.sub, id.to_string());
        assert_eq!(a.role, Role::FacilityOwner);
        assert_eq!(a.token_type, "access");

        let r = verify_token(&refresh, SECRET).unwrap();
        assert_eq!(r.token_type, "refresh");
        assert!(r.exp > a.exp);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (access, _) = generate_tokens(Uuid::new_v4(), Role::User, SECRET, 3600, 7200).unwrap();
        assert!(matches!(
            verify_token(&access, "other-secret"),
            Err(AppError::Jwt(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let (access, _) = generate_tokens(Uuid::new_v4(), Role::User, SECRET, -3600, -3600).unwrap();
        assert!(verify_token(&access, SECRET).is_err());
    }
}
