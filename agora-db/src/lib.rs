use agora_common::{
    model::{
        Id, ModelValidationError,
        player::{CreatePlayer, Player, PlayerMarker},
        post::{CreatePost, Post, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    snowflake::IdGenerationError,
};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

pub mod client;
pub mod memory;
mod record;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    IdGeneration(#[from] IdGenerationError),
    #[error("A user named {0} already exists")]
    DuplicateUsername(Username),
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// Collection-scoped persistence for posts, players and users.
///
/// Every method is a single-document operation; listings are sorted newest
/// first by creation time, ties broken by id.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>>;

    async fn fetch_posts(&self) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Removes the post and returns it, or `None` if no post had that id.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_player(&self, player: &CreatePlayer) -> Result<Id<PlayerMarker>>;

    async fn fetch_players(&self) -> Result<Vec<Player>>;

    async fn fetch_player(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>>;

    /// Atomically increments the visit counter and returns the updated player.
    async fn record_player_visit(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>>;
}
