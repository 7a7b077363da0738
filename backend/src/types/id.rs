//! Typed identifier wrappers for compile-time type safety.
//!
//! Participant and restaurant ids are opaque strings handed to us by clients,
//! the auth provider or a place-data source, so these wrap `String` rather
//! than a UUID. Session codes get their own type because they are normalised
//! and validated on the way in.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Macro to generate typed string id wrappers with common trait implementations.
macro_rules! typed_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
        #[schema(value_type = String)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                String::deserialize(deserializer).map(Self)
            }
        }
    };
}

typed_id!(UserId, "Identifier of a session participant.");
typed_id!(RestaurantId, "Identifier of a restaurant as issued by its place-data source.");

impl UserId {
    /// Mints an id for a participant the auth provider does not know about.
    pub fn anonymous() -> Self {
        let bytes: [u8; 16] = rand::random();
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("user-{}", hex))
    }
}

/// Characters used for generated codes. 0/O and 1/I/L are left out so codes
/// survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GENERATED_CODE_LEN: usize = 6;
const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 12;

/// Short, shareable session code. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[schema(value_type = String, example = "K7QX2M")]
pub struct SessionCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session codes are 4-12 ASCII letters or digits")]
pub struct InvalidSessionCode;

impl SessionCode {
    /// Generates a random code from the unambiguous alphabet.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..GENERATED_CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidSessionCode> {
        let trimmed = raw.trim();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&trimmed.len())
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(InvalidSessionCode);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = InvalidSessionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SessionCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
