//! Form bodies with an optional image, and the directory images are kept in.

use crate::server::{ServerError, json::Json};
use agora_common::{model::IdSource, util::NonBlankString};
use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// The only multipart field that may carry a file.
pub const IMAGE_FIELD: &str = "image";
/// Where stored images are served from.
pub const UPLOADS_ROUTE: &str = "/uploads";

const MAX_FILE_NAME_LEN: usize = 100;
/// Longest extension, dot included, kept when a name is shortened.
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Text fields plus at most one image, from either a `multipart/form-data`
/// or a JSON object body.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<ImageUpload>,
}

impl UploadForm {
    #[must_use]
    pub fn optional_text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn required_text(&mut self, name: &'static str) -> Result<NonBlankString, ServerError> {
        self.optional_text(name)
            .and_then(|text| NonBlankString::new(text).ok())
            .ok_or(ServerError::MissingField(name))
    }

    #[must_use]
    pub fn take_image(&mut self) -> Option<ImageUpload> {
        self.image.take()
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();

            let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
                let text = field.text().await?;
                form.fields.insert(name, text);
                continue;
            };

            let content_type = field.content_type().unwrap_or_default().to_owned();
            let bytes = field.bytes().await?;

            // Browsers send an empty, nameless part for an untouched file input.
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            if name != IMAGE_FIELD {
                return Err(ServerError::UnexpectedFile(name));
            }
            if form.image.is_some() {
                return Err(ServerError::TooManyFiles);
            }
            if !is_image(&content_type) {
                return Err(ServerError::NotAnImage(content_type));
            }

            form.image = Some(ImageUpload {
                file_name,
                content_type,
                bytes,
            });
        }

        Ok(form)
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(request, state).await?;
            Self::from_multipart(multipart).await
        } else {
            let Json(fields) = Json::<HashMap<String, String>>::from_request(request, state).await?;
            Ok(Self {
                fields,
                image: None,
            })
        }
    }
}

/// Whether a declared content type names an image. The bytes are not inspected.
#[must_use]
pub fn is_image(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Reduces a client supplied file name to a safe, short file name component.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    let base_name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let sanitized: String = base_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        return "image".to_owned();
    }
    if sanitized.len() <= MAX_FILE_NAME_LEN {
        return sanitized;
    }

    // Only ASCII is left, so byte offsets are char boundaries.
    match sanitized.rfind('.') {
        Some(dot) if dot > 0 && sanitized.len() - dot <= MAX_EXTENSION_LEN => {
            let extension = &sanitized[dot..];
            format!(
                "{}{extension}",
                &sanitized[..MAX_FILE_NAME_LEN - extension.len()]
            )
        }
        _ => sanitized[..MAX_FILE_NAME_LEN].to_owned(),
    }
}

/// The directory uploaded images are written to.
///
/// Stored names start with a fresh snowflake, so two uploads never share a
/// name. Files are created exclusively and never overwritten.
#[derive(Debug)]
pub struct UploadDir {
    root: PathBuf,
    ids: IdSource,
}

impl UploadDir {
    /// Opens the directory, creating it if needed.
    pub async fn create(root: impl Into<PathBuf>, ids: IdSource) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        Ok(Self { root, ids })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the image and returns the URL it is served at.
    pub async fn store(&self, image: &ImageUpload) -> Result<String, ServerError> {
        let snowflake = self.ids.next_snowflake()?;
        let stored_name = format!("{snowflake}-{}", sanitize_file_name(&image.file_name));

        write_new_file(&self.root.join(&stored_name), &image.bytes)
            .await
            .map_err(ServerError::Upload)?;

        debug!(
            %stored_name,
            content_type = %image.content_type,
            bytes = image.bytes.len(),
            "Stored upload"
        );
        Ok(format!("{UPLOADS_ROUTE}/{stored_name}"))
    }

    fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let stored_name = url.strip_prefix(UPLOADS_ROUTE)?.strip_prefix('/')?;

        let is_plain_name = !stored_name.is_empty()
            && !stored_name.contains(['/', '\\'])
            && stored_name != "."
            && stored_name != "..";

        is_plain_name.then(|| self.root.join(stored_name))
    }

    /// Deletes a previously stored image. Returns whether a file was removed.
    pub async fn remove(&self, url: &str) -> io::Result<bool> {
        let Some(path) = self.path_for_url(url) else {
            return Ok(false);
        };

        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Like [`UploadDir::remove`], logging instead of failing.
    pub async fn discard(&self, url: &str) {
        match self.remove(url).await {
            Ok(true) => debug!(url, "Removed upload"),
            Ok(false) => debug!(url, "Upload to remove was already gone"),
            Err(err) => warn!(url, error = %err, "Could not remove upload"),
        }
    }
}

/// Creates `path` and fills it with `bytes`. A file that could not be written
/// completely is removed again.
async fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    drop(file);

    remove_on_error(path, written).await
}

async fn remove_on_error(path: &Path, written: io::Result<()>) -> io::Result<()> {
    match written {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(path).await {
                warn!(
                    path = %path.display(),
                    error = %remove_err,
                    "Could not remove partially written upload"
                );
            }
            Err(err)
        }
    }
}
