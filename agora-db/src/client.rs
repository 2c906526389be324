use crate::{
    DbError, Result, Store,
    record::{PlayerRecord, PostRecord, UserRecord},
};
use agora_common::model::{
    Id, IdSource,
    player::{CreatePlayer, Player, PlayerMarker},
    post::{CreatePost, Post, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database, IndexModel,
    error::{ErrorKind, WriteError, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use std::fmt::{Debug, Formatter};
use tracing::{debug, info};

pub const POSTS_COLLECTION: &str = "posts";
pub const PLAYERS_COLLECTION: &str = "players";
pub const USERS_COLLECTION: &str = "users";

const DUPLICATE_KEY_CODE: i32 = 11000;

fn newest_first() -> Document {
    doc! { "createdAt": -1, "_id": -1 }
}

fn by_id(id: i64) -> Document {
    doc! { "_id": id }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY_CODE,
            ..
        }))
    )
}

/// A [`Store`] backed by a MongoDB database.
pub struct DbClient {
    posts: Collection<PostRecord>,
    players: Collection<PlayerRecord>,
    users: Collection<UserRecord>,
    ids: IdSource,
}

impl DbClient {
    #[must_use]
    pub fn new(database: &Database, ids: IdSource) -> Self {
        Self {
            posts: database.collection(POSTS_COLLECTION),
            players: database.collection(PLAYERS_COLLECTION),
            users: database.collection(USERS_COLLECTION),
            ids,
        }
    }

    /// Connects, checks the server is reachable and creates the indexes.
    pub async fn connect(uri: &str, database_name: &str, ids: IdSource) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database_name);

        database.run_command(doc! { "ping": 1 }).await?;
        info!(database = database_name, "Connected to MongoDB");

        let db_client = Self::new(&database, ids);
        db_client.ensure_indexes().await?;

        Ok(db_client)
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique_username = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(unique_username).await?;

        self.posts
            .create_index(IndexModel::builder().keys(newest_first()).build())
            .await?;
        self.players
            .create_index(IndexModel::builder().keys(newest_first()).build())
            .await?;

        debug!("Indexes are in place");
        Ok(())
    }
}

impl Debug for DbClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("posts", &self.posts.name())
            .field("players", &self.players.name())
            .field("users", &self.users.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for DbClient {
    async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let (post_id, created_at) = self.ids.next_id()?;

        self.posts
            .insert_one(PostRecord::new(post_id, created_at, post))
            .await?;

        Ok(post_id)
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let records: Vec<PostRecord> = self
            .posts
            .find(doc! {})
            .sort(newest_first())
            .await?
            .try_collect()
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = self.posts.find_one(by_id(post_id.as_i64())).await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = self
            .posts
            .find_one_and_delete(by_id(post_id.as_i64()))
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn create_player(&self, player: &CreatePlayer) -> Result<Id<PlayerMarker>> {
        let (player_id, created_at) = self.ids.next_id()?;

        self.players
            .insert_one(PlayerRecord::new(player_id, created_at, player))
            .await?;

        Ok(player_id)
    }

    async fn fetch_players(&self) -> Result<Vec<Player>> {
        let records: Vec<PlayerRecord> = self
            .players
            .find(doc! {})
            .sort(newest_first())
            .await?
            .try_collect()
            .await?;

        let players = records
            .into_iter()
            .map(Player::try_from)
            .collect::<Result<_, _>>()?;
        Ok(players)
    }

    async fn fetch_player(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>> {
        let record = self.players.find_one(by_id(player_id.as_i64())).await?;

        let player = record.map(Player::try_from).transpose()?;
        Ok(player)
    }

    async fn record_player_visit(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>> {
        let record = self
            .players
            .find_one_and_update(
                by_id(player_id.as_i64()),
                doc! { "$inc": { "visits": 1_i64 } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        let player = record.map(Player::try_from).transpose()?;
        Ok(player)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = self
            .users
            .find_one(doc! { "username": username.get() })
            .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let (user_id, _) = self.ids.next_id()?;

        self.users
            .insert_one(UserRecord::new(user_id, user))
            .await
            .map_err(|err| {
                if is_duplicate_key(&err) {
                    DbError::DuplicateUsername(user.username.clone())
                } else {
                    DbError::Mongo(err)
                }
            })?;

        Ok(user_id)
    }
}
