use crate::{model::Id, util::NonBlankString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Author name used when a post is submitted without one.
pub const DEFAULT_AUTHOR_NAME: &str = "Anonymous";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    #[serde(rename = "userName")]
    pub author_name: String,
    pub content: NonBlankString,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author_name: String,
    pub content: NonBlankString,
    pub image_url: Option<String>,
}

impl CreatePost {
    /// Blank or missing author names fall back to [`DEFAULT_AUTHOR_NAME`].
    #[must_use]
    pub fn new(author_name: Option<String>, content: NonBlankString) -> Self {
        let author_name = author_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_owned());

        Self {
            author_name,
            content,
            image_url: None,
        }
    }

    #[must_use]
    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }
}
