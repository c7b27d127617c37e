pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, CoreError, CoreResult};
use crate::models::{Role, User};
use crate::state::AppState;
use jwt::JwtService;

/// Who is making a request. Every engine operation takes one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Turns credentials into identities and back. Never touches the store.
#[derive(Clone)]
pub struct IdentityContext {
    jwt: JwtService,
}

impl IdentityContext {
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }

    pub fn resolve(&self, credential: Option<&str>) -> CoreResult<Identity> {
        let token = credential
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(CoreError::Unauthenticated("missing_credential"))?;

        let claims = self
            .jwt
            .verify_token(token)
            .map_err(|_| CoreError::Unauthenticated("invalid_credential"))?;

        Ok(Identity {
            user_id: claims.sub,
            role: claims.role,
            email: claims.email,
        })
    }

    pub fn issue(&self, user: &User) -> CoreResult<AccessToken> {
        let access_token = self
            .jwt
            .generate_token(user.id, &user.email, user.role)
            .map_err(CoreError::storage)?;
        Ok(AccessToken {
            access_token,
            token_type: "Bearer",
            expires_in: self.jwt.expiry_seconds(),
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok();
        let credential = bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token());

        state
            .service
            .identity()
            .resolve(credential)
            .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::AppConfig;

    fn context() -> IdentityContext {
        let config = AppConfig::for_tests("secret");
        IdentityContext::new(JwtService::from_config(&config).unwrap())
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            full_name: None,
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolves_issued_credentials() {
        let ctx = context();
        let user = user(Role::Grantee);
        let token = ctx.issue(&user).unwrap();
        assert_eq!(token.token_type, "Bearer");

        let identity = ctx.resolve(Some(&token.access_token)).unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.role, Role::Grantee);
        assert_eq!(identity.email, user.email);
    }

    #[test]
    fn missing_or_blank_credentials_are_unauthenticated() {
        let ctx = context();
        assert_eq!(
            ctx.resolve(None),
            Err(CoreError::Unauthenticated("missing_credential"))
        );
        assert_eq!(
            ctx.resolve(Some("  ")),
            Err(CoreError::Unauthenticated("missing_credential"))
        );
    }

    #[test]
    fn malformed_credentials_are_unauthenticated() {
        assert_eq!(
            context().resolve(Some("abc.def.ghi")),
            Err(CoreError::Unauthenticated("invalid_credential"))
        );
    }
}
