//! Startup tasks that prepare the store before the server accepts requests.

use agora_common::model::{
    Id,
    auth::{PasswordHash, PasswordHashError},
    user::{CreateUser, InvalidUsernameError, Role, UserMarker, Username},
};
use agora_db::{DbError, Store};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Admin username is invalid: {0}")]
    InvalidUsername(#[from] InvalidUsernameError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Admin user could not be stored: {0}")]
    Database(#[from] DbError),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum SeedOutcome {
    Created(Id<UserMarker>),
    Existing(Id<UserMarker>),
}

/// Makes sure an admin account named `username` exists.
///
/// An existing account is left untouched, including its password and role.
pub async fn seed_admin(
    store: &dyn Store,
    username: &str,
    password: &str,
) -> Result<SeedOutcome, SeedError> {
    let username = Username::new(username.to_owned())?;

    if let Some(user) = store.fetch_user_by_username(&username).await? {
        info!(%username, "Admin user already exists");
        return Ok(SeedOutcome::Existing(user.id));
    }

    let admin = CreateUser {
        username,
        password_hash: PasswordHash::generate(password)?,
        role: Role::Admin,
    };

    match store.create_user(&admin).await {
        Ok(id) => {
            info!(username = %admin.username, "Admin user created");
            Ok(SeedOutcome::Created(id))
        }
        // Another instance seeded the same account in the meantime.
        Err(DbError::DuplicateUsername(username)) => {
            let user = store
                .fetch_user_by_username(&username)
                .await?
                .ok_or(DbError::DuplicateUsername(username))?;
            Ok(SeedOutcome::Existing(user.id))
        }
        Err(err) => Err(err.into()),
    }
}
