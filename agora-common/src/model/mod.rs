pub mod auth;
pub mod player;
pub mod post;
pub mod user;

use crate::{
    model::{auth::PasswordHashError, user::InvalidUsernameError},
    snowflake::{Epoch, IdGenerationError, ProcessId, Snowflake, SnowflakeGenerator, WorkerId},
    util::BlankStringError,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{
    fmt::{self, Display, Formatter},
    marker::PhantomData,
    num::ParseIntError,
    str::FromStr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use time::{OffsetDateTime, macros::datetime};

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    BlankString(#[from] BlankStringError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Negative counter value: {0}")]
    NegativeCounter(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AgoraEpoch;
impl Epoch for AgoraEpoch {
    const EPOCH_TIME: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
}

pub type AgoraSnowflake = Snowflake<AgoraEpoch>;
pub type AgoraSnowflakeGenerator = SnowflakeGenerator<AgoraEpoch>;

/// A thread-safe source of fresh snowflakes.
#[derive(Debug, Default)]
pub struct IdSource {
    generator: Mutex<AgoraSnowflakeGenerator>,
}

impl IdSource {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            generator: Mutex::new(AgoraSnowflakeGenerator::new(worker_id, process_id)),
        }
    }

    pub fn next_snowflake(&self) -> Result<AgoraSnowflake, IdGenerationError> {
        self.generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
    }

    /// A fresh id together with the creation time it encodes.
    pub fn next_id<Marker>(&self) -> Result<(Id<Marker>, OffsetDateTime), IdGenerationError> {
        let snowflake = self.next_snowflake()?;
        Ok((snowflake.into(), snowflake.created_at()))
    }
}

/// A typed snowflake id.
///
/// Serialized as a decimal string, since JSON numbers above 2^53 lose
/// precision in JavaScript clients. Deserializing accepts strings and
/// unsigned integers.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(AgoraSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: AgoraSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> AgoraSnowflake {
        self.0
    }

    /// The id as stored in the `_id` field of a document.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::from)
    }
}

impl<Marker> From<AgoraSnowflake> for Id<Marker> {
    fn from(value: AgoraSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for AgoraSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(AgoraSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor<Marker>(PhantomData<Marker>);

        impl<Marker> Visitor<'_> for IdVisitor<Marker> {
            type Value = Id<Marker>;

            fn expecting(&self, f: &mut Formatter) -> fmt::Result {
                f.write_str("a snowflake id as a decimal string or unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(value.into())
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value
                    .parse()
                    .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}
