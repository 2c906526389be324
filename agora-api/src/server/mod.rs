use agora_common::{
    model::{
        Id,
        auth::PasswordHashError,
        player::PlayerMarker,
        post::PostMarker,
        user::{Capability, Role},
    },
    snowflake::IdGenerationError,
};
use agora_db::{DbError, Store};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use token::TokenIssuer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, error};
use upload::{UPLOADS_ROUTE, UploadDir};

pub mod auth;
pub mod json;
mod routes;
pub mod token;
pub mod upload;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenIssuer>,
    pub uploads: Arc<UploadDir>,
}

pub fn routes() -> ServerRouter {
    routes::routes()
        .fallback(fallback)
        .method_not_allowed_fallback(method_not_allowed)
}

/// The complete application: API routes, the upload file server and the
/// request-wide layers.
pub fn app(state: ServerState, max_upload_bytes: usize) -> Router {
    let upload_files = ServeDir::new(state.uploads.root());

    routes()
        .nest_service(UPLOADS_ROUTE, upload_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub async fn method_not_allowed(request: Request) -> ServerError {
    let (parts, _) = request.into_parts();
    ServerError::MethodNotAllowed(parts.method, parts.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Method {0} is not allowed on {1}")]
    MethodNotAllowed(Method, Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Required field {0} was missing or blank")]
    MissingField(&'static str),
    #[error("Only one file may be uploaded")]
    TooManyFiles,
    #[error("Files may only be uploaded in the image field, not {0:?}")]
    UnexpectedFile(String),
    #[error("Uploaded file is not an image: {0:?}")]
    NotAnImage(String),
    #[error("Uploaded file could not be stored: {0}")]
    Upload(std::io::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Provided token was invalid: {0}")]
    InvalidToken(jsonwebtoken::errors::Error),
    #[error("Token could not be issued: {0}")]
    TokenIssue(jsonwebtoken::errors::Error),
    #[error("Role {role} lacks capability {capability:?}")]
    Forbidden { role: Role, capability: Capability },
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Could not generate an id: {0}")]
    IdGeneration(#[from] IdGenerationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Player with id {0} was not found.")]
    PlayerByIdNotFound(Id<PlayerMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::PlayerByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed(..) => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidToken(_)
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ServerError::MultipartRejection(rejection) => rejection.status(),
            ServerError::Multipart(err) => err.status(),
            ServerError::PathRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MissingField(_)
            | ServerError::TooManyFiles
            | ServerError::UnexpectedFile(_)
            | ServerError::NotAnImage(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Upload(_)
            | ServerError::TokenIssue(_)
            | ServerError::PasswordHash(_)
            | ServerError::IdGeneration(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Internal server error".to_owned()
        } else {
            debug!(error = %self, %status, "Rejecting request");
            self.to_string()
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}
