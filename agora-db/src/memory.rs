//! An in-process [`Store`] for tests and local experiments.
//!
//! Mirrors the document store's behavior: single-record operations, newest
//! first listings and a unique username constraint.

use crate::{DbError, Result, Store};
use agora_common::model::{
    Id, IdSource,
    player::{CreatePlayer, Player, PlayerMarker},
    post::{CreatePost, Post, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: IdSource,
    collections: Mutex<Collections>,
}

#[derive(Debug, Default)]
struct Collections {
    posts: Vec<Post>,
    players: Vec<Player>,
    users: Vec<User>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(ids: IdSource) -> Self {
        Self {
            ids,
            collections: Mutex::default(),
        }
    }

    fn collections(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let (id, created_at) = self.ids.next_id()?;

        self.collections().posts.push(Post {
            id,
            author_name: post.author_name.clone(),
            content: post.content.clone(),
            image_url: post.image_url.clone(),
            created_at,
        });

        Ok(id)
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let mut posts = self.collections().posts.clone();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let collections = self.collections();
        Ok(collections.posts.iter().find(|post| post.id == post_id).cloned())
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut collections = self.collections();
        let position = collections.posts.iter().position(|post| post.id == post_id);
        Ok(position.map(|index| collections.posts.remove(index)))
    }

    async fn create_player(&self, player: &CreatePlayer) -> Result<Id<PlayerMarker>> {
        let (id, created_at) = self.ids.next_id()?;

        self.collections().players.push(Player {
            id,
            name: player.name.clone(),
            biography: player.biography.clone(),
            image_url: player.image_url.clone(),
            visits: 0,
            created_at,
        });

        Ok(id)
    }

    async fn fetch_players(&self) -> Result<Vec<Player>> {
        let mut players = self.collections().players.clone();
        players.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(players)
    }

    async fn fetch_player(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>> {
        let collections = self.collections();
        Ok(collections
            .players
            .iter()
            .find(|player| player.id == player_id)
            .cloned())
    }

    async fn record_player_visit(&self, player_id: Id<PlayerMarker>) -> Result<Option<Player>> {
        let mut collections = self.collections();
        let player = collections
            .players
            .iter_mut()
            .find(|player| player.id == player_id)
            .map(|player| {
                player.visits += 1;
                player.clone()
            });
        Ok(player)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let collections = self.collections();
        Ok(collections
            .users
            .iter()
            .find(|user| &user.username == username)
            .cloned())
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let (id, _) = self.ids.next_id()?;

        let mut collections = self.collections();
        if collections
            .users
            .iter()
            .any(|existing| existing.username == user.username)
        {
            return Err(DbError::DuplicateUsername(user.username.clone()));
        }

        collections.users.push(User {
            id,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
        });

        Ok(id)
    }
}
