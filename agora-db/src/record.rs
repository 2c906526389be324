use agora_common::{
    model::{
        Id, ModelValidationError,
        auth::PasswordHash,
        player::{CreatePlayer, Player, PlayerMarker},
        post::{CreatePost, Post, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    util::NonBlankString,
};
use bson::DateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_name: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerRecord {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub biography: String,
    pub image_url: Option<String>,
    pub visits: i64,
    pub created_at: DateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    #[serde(rename = "_id")]
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

impl PostRecord {
    pub fn new(id: Id<PostMarker>, created_at: OffsetDateTime, post: &CreatePost) -> Self {
        Self {
            id: id.as_i64(),
            user_name: post.author_name.clone(),
            content: post.content.get().to_owned(),
            image_url: post.image_url.clone(),
            created_at: DateTime::from_time_0_3(created_at),
        }
    }
}

impl PlayerRecord {
    pub fn new(id: Id<PlayerMarker>, created_at: OffsetDateTime, player: &CreatePlayer) -> Self {
        Self {
            id: id.as_i64(),
            name: player.name.get().to_owned(),
            biography: player.biography.get().to_owned(),
            image_url: player.image_url.clone(),
            visits: 0,
            created_at: DateTime::from_time_0_3(created_at),
        }
    }
}

impl UserRecord {
    pub fn new(id: Id<UserMarker>, user: &CreateUser) -> Self {
        Self {
            id: id.as_i64(),
            username: user.username.get().to_owned(),
            password_hash: user.password_hash.as_phc_str().to_owned(),
            role: user.role.as_str().to_owned(),
        }
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_i64(value.id),
            author_name: value.user_name,
            content: NonBlankString::new(value.content)?,
            image_url: value.image_url,
            created_at: value.created_at.to_time_0_3(),
        })
    }
}

impl TryFrom<PlayerRecord> for Player {
    type Error = ModelValidationError;

    fn try_from(value: PlayerRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_i64(value.id),
            name: NonBlankString::new(value.name)?,
            biography: NonBlankString::new(value.biography)?,
            image_url: value.image_url,
            visits: u64::try_from(value.visits)
                .map_err(|_| ModelValidationError::NegativeCounter(value.visits))?,
            created_at: value.created_at.to_time_0_3(),
        })
    }
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_i64(value.id),
            username: Username::new(value.username)?,
            password_hash: PasswordHash::from_phc_string(value.password_hash)?,
            role: value.role.parse()?,
        })
    }
}
