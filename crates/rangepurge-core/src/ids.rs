//! Time-ordered identifiers for messages, channels and users.
//!
//! Identifiers are 64-bit snowflakes: the upper 42 bits hold the number of
//! milliseconds since [`SNOWFLAKE_EPOCH_MS`], so ordering ids orders them by
//! creation time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds between the Unix epoch and the snowflake epoch (2015-01-01).
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Number of low bits that do not encode time.
const TIMESTAMP_SHIFT: u32 = 22;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw snowflake value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw snowflake value.
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Zero is reserved for "unset".
            pub const fn is_unset(self) -> bool {
                self.0 == 0
            }

            /// Creation time encoded in the id.
            pub fn timestamp(self) -> DateTime<Utc> {
                let ms = (self.0 >> TIMESTAMP_SHIFT) as i64 + SNOWFLAKE_EPOCH_MS;
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }

            /// Build an id created at `at`; `seq` fills the low bits so several ids
            /// can share a millisecond.
            pub fn from_timestamp(at: DateTime<Utc>, seq: u64) -> Self {
                let ms = (at.timestamp_millis() - SNOWFLAKE_EPOCH_MS).max(0) as u64;
                Self((ms << TIMESTAMP_SHIFT) | (seq & ((1 << TIMESTAMP_SHIFT) - 1)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a chat message. Also used as a range marker.
    MessageId
);
snowflake_id!(
    /// Identifier of a chat channel.
    ChannelId
);
snowflake_id!(
    /// Identifier of a user.
    UserId
);
