use crate::server::ServerRouter;
use axum::Router;

mod auth;
mod players;
mod posts;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(players::routes())
        .merge(auth::routes())
}
