use crate::server::{
    Result, ServerError, ServerRouter,
    json::{Created, Json},
    upload::{UploadDir, UploadForm},
};
use agora_common::model::{
    Id,
    player::{CreatePlayer, Player, PlayerMarker},
};
use agora_db::Store;
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(add_player)
        .typed_get(list_players)
        .typed_get(get_player)
        .typed_patch(record_visit)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCreated {
    message: &'static str,
    player_id: Id<PlayerMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/players", rejection(ServerError))]
struct PlayersPath();

async fn add_player(
    PlayersPath(): PlayersPath,
    State(store): State<Arc<dyn Store>>,
    State(uploads): State<Arc<UploadDir>>,
    mut form: UploadForm,
) -> Result<Created<PlayerCreated>> {
    let name = form.required_text("name")?;
    let biography = form.required_text("biography")?;

    let image_url = match form.take_image() {
        Some(image) => Some(uploads.store(&image).await?),
        None => None,
    };
    let player = CreatePlayer {
        name,
        biography,
        image_url,
    };

    let player_id = match store.create_player(&player).await {
        Ok(player_id) => player_id,
        Err(err) => {
            if let Some(url) = &player.image_url {
                uploads.discard(url).await;
            }
            return Err(err.into());
        }
    };

    info!(%player_id, name = player.name.get(), "Player added");
    Ok(Created(PlayerCreated {
        message: "Player added successfully",
        player_id,
    }))
}

async fn list_players(
    PlayersPath(): PlayersPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Vec<Player>>> {
    let players = store.fetch_players().await?;

    Ok(Json(players))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/players/{id}", rejection(ServerError))]
struct PlayerPath {
    id: Id<PlayerMarker>,
}

async fn get_player(
    PlayerPath { id }: PlayerPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Player>> {
    let player = store
        .fetch_player(id)
        .await?
        .ok_or(ServerError::PlayerByIdNotFound(id))?;

    Ok(Json(player))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/players/{id}/visits", rejection(ServerError))]
struct PlayerVisitsPath {
    id: Id<PlayerMarker>,
}

async fn record_visit(
    PlayerVisitsPath { id }: PlayerVisitsPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Player>> {
    let player = store
        .record_player_visit(id)
        .await?
        .ok_or(ServerError::PlayerByIdNotFound(id))?;

    Ok(Json(player))
}
