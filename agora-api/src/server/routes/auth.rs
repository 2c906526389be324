use crate::server::{Result, ServerError, ServerRouter, json::Json, token::TokenIssuer};
use agora_common::model::user::Username;
use agora_db::Store;
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(login)
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    token_type: &'static str,
    expires_in: i64,
}

fn present(value: Option<String>, field: &'static str) -> Result<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(ServerError::MissingField(field))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/login", rejection(ServerError))]
struct LoginPath();

async fn login(
    LoginPath(): LoginPath,
    State(store): State<Arc<dyn Store>>,
    State(tokens): State<Arc<TokenIssuer>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let username = present(request.username, "username")?;
    let password = present(request.password, "password")?;

    // A name that could never have been registered cannot match a user.
    let Ok(username) = Username::new(username) else {
        return Err(ServerError::InvalidCredentials);
    };

    let Some(user) = store.fetch_user_by_username(&username).await? else {
        debug!(%username, "Login for unknown user");
        return Err(ServerError::InvalidCredentials);
    };
    if !user.password_hash.verify(&password)? {
        debug!(%username, "Login with wrong password");
        return Err(ServerError::InvalidCredentials);
    }

    let issued = tokens.issue(&user).map_err(ServerError::TokenIssue)?;

    info!(%username, role = %user.role, "User logged in");
    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_in: tokens.lifetime().get().whole_seconds(),
    }))
}
