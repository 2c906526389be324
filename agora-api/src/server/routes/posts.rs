use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AdminUser,
    json::{Created, Json},
    upload::{UploadDir, UploadForm},
};
use agora_common::model::{
    Id,
    post::{CreatePost, Post, PostMarker},
};
use agora_db::Store;
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(list_posts)
        .typed_get(get_post)
        .typed_delete(delete_post)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostResponse {
    message: &'static str,
    post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/post", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(store): State<Arc<dyn Store>>,
    State(uploads): State<Arc<UploadDir>>,
    mut form: UploadForm,
) -> Result<Created<PostResponse>> {
    let content = form.required_text("content")?;
    let author_name = form.optional_text("userName");

    let image_url = match form.take_image() {
        Some(image) => Some(uploads.store(&image).await?),
        None => None,
    };
    let post = CreatePost::new(author_name, content).with_image_url(image_url);

    let post_id = match store.create_post(&post).await {
        Ok(post_id) => post_id,
        Err(err) => {
            if let Some(url) = &post.image_url {
                uploads.discard(url).await;
            }
            return Err(err.into());
        }
    };

    info!(%post_id, author = %post.author_name, "Post created");
    Ok(Created(PostResponse {
        message: "Post created successfully",
        post_id,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts", rejection(ServerError))]
struct ListPostsPath();

async fn list_posts(
    ListPostsPath(): ListPostsPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Vec<Post>>> {
    let posts = store.fetch_posts().await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<Post>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

// The path is only checked once the caller is known to be an admin, so
// anyone else is turned away with 401 or 403 whatever id they send.
async fn delete_post(
    path: Result<PostPath, ServerError>,
    admin: AdminUser,
    State(store): State<Arc<dyn Store>>,
    State(uploads): State<Arc<UploadDir>>,
) -> Result<Json<PostResponse>> {
    let PostPath { id } = path?;

    let post = store
        .delete_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if let Some(url) = &post.image_url {
        uploads.discard(url).await;
    }

    info!(post_id = %id, by = %admin.user().username(), "Post deleted");
    Ok(Json(PostResponse {
        message: "Post deleted successfully",
        post_id: id,
    }))
}
