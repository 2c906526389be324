use crate::{model::Id, util::NonBlankString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PlayerMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Id<PlayerMarker>,
    pub name: NonBlankString,
    pub biography: NonBlankString,
    pub image_url: Option<String>,
    pub visits: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePlayer {
    pub name: NonBlankString,
    pub biography: NonBlankString,
    pub image_url: Option<String>,
}
