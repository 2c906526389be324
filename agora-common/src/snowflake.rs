//! Time-ordered 64-bit ids.
//!
//! From the most significant bit down: 42 bits of milliseconds since the
//! epoch, a 5 bit worker id, a 5 bit process id and a 12 bit sequence.

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const SEQUENCE_BITS: u32 = 12;

const PROCESS_ID_SHIFT: u32 = SEQUENCE_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const MAX_TIMESTAMP: u64 = mask(TIMESTAMP_BITS);
#[allow(clippy::cast_possible_truncation)]
const MAX_SEQUENCE: u16 = mask(SEQUENCE_BITS) as u16;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: OffsetDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum IdGenerationError {
    #[error("The clock reads a time before the id epoch")]
    BeforeEpoch,
    #[error("The id epoch has run out of timestamp bits")]
    EpochExhausted,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("{kind} {value} does not fit into {bits} bits")]
pub struct GeneratorIdOutOfRange {
    kind: &'static str,
    value: u8,
    bits: u32,
}

macro_rules! generator_id {
    ($(#[$meta:meta])* $name:ident, bits = $bits:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "u8", into = "u8")]
        pub struct $name(u8);

        impl $name {
            pub fn new(value: u8) -> Result<Self, GeneratorIdOutOfRange> {
                if u64::from(value) <= mask($bits) {
                    Ok(Self(value))
                } else {
                    Err(GeneratorIdOutOfRange {
                        kind: stringify!($name),
                        value,
                        bits: $bits,
                    })
                }
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = GeneratorIdOutOfRange;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

generator_id!(
    /// Distinguishes machines sharing one database.
    WorkerId,
    bits = WORKER_ID_BITS
);
generator_id!(
    /// Distinguishes processes on one machine.
    ProcessId,
    bits = PROCESS_ID_BITS
);

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Snowflake<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        sequence: u16,
    ) -> Self {
        Self::new(
            ((millis & MAX_TIMESTAMP) << TIMESTAMP_SHIFT)
                | (u64::from(worker_id.get()) << WORKER_ID_SHIFT)
                | (u64::from(process_id.get()) << PROCESS_ID_SHIFT)
                | u64::from(sequence & MAX_SEQUENCE),
        )
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds between the epoch and the moment the id was generated.
    #[must_use]
    pub fn millis(self) -> u64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(((self.0 >> WORKER_ID_SHIFT) & mask(WORKER_ID_BITS)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(((self.0 >> PROCESS_ID_SHIFT) & mask(PROCESS_ID_BITS)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sequence(self) -> u16 {
        (self.0 & mask(SEQUENCE_BITS)) as u16
    }

    #[must_use]
    pub fn created_at(self) -> OffsetDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        // At most 42 bits, so the cast is lossless.
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(self.millis().cast_signed())
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

fn millis_since<SnowflakeEpoch: Epoch>(time: OffsetDateTime) -> Result<u64, IdGenerationError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    u64::try_from(millis).map_err(|_| IdGenerationError::BeforeEpoch)
}

/// Hands out strictly increasing snowflakes.
///
/// When the clock stalls or runs backwards the generator keeps counting from
/// the last timestamp it used, moving on to the next millisecond once the
/// sequence is used up.
#[derive_where(Clone, Eq, PartialEq, Debug, Default)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last: Option<(u64, u16)>,
    epoch: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last: None,
            epoch: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: OffsetDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, IdGenerationError>
    where
        SnowflakeEpoch: Epoch,
    {
        let now = millis_since::<SnowflakeEpoch>(time)?;

        let (millis, sequence) = match self.last {
            Some((last_millis, sequence)) if now <= last_millis => {
                if sequence < MAX_SEQUENCE {
                    (last_millis, sequence + 1)
                } else {
                    (last_millis + 1, 0)
                }
            }
            _ => (now, 0),
        };
        if millis > MAX_TIMESTAMP {
            return Err(IdGenerationError::EpochExhausted);
        }

        self.last = Some((millis, sequence));
        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            sequence,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, IdGenerationError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(OffsetDateTime::now_utc())
    }
}
