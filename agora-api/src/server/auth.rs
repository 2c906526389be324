use crate::server::{ServerError, token::TokenIssuer};
use agora_common::model::{
    Id,
    auth::Claims,
    user::{Capability, Role, UserMarker, Username},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// A caller that presented a valid, unexpired bearer token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    claims: Claims,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.claims.user_id()
    }

    #[must_use]
    pub fn username(&self) -> &Username {
        &self.claims.username
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.claims.role
    }

    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn authorize(&self, capability: Capability) -> Result<(), ServerError> {
        if self.role().can(capability) {
            Ok(())
        } else {
            Err(ServerError::Forbidden {
                role: self.role(),
                capability,
            })
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenIssuer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?;

        let claims = Arc::<TokenIssuer>::from_ref(state)
            .verify(request_token.token())
            .map_err(ServerError::InvalidToken)?;

        Ok(Self { claims })
    }
}

/// An authenticated caller whose role may moderate content.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AdminUser(AuthenticatedUser);

impl AdminUser {
    #[must_use]
    pub fn user(&self) -> &AuthenticatedUser {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    Arc<TokenIssuer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        user.authorize(Capability::DeletePosts)?;

        Ok(Self(user))
    }
}
