use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

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
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque, stable identity of an authenticated principal.
    ActorId
);
string_id!(
    /// Identity of a counterpart; doubles as the conversation key.
    ConversationId
);
string_id!(
    /// Time-derived turn id. Lexicographic order follows creation time.
    TurnId
);

impl TurnId {
    /// Generate an id whose prefix is the zero-padded creation time in
    /// microseconds, followed by a random suffix to avoid collisions.
    pub fn generate(created_at: chrono::DateTime<chrono::Utc>) -> Self {
        let micros = created_at.timestamp_micros().max(0);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{micros:019}-{}", &suffix[..12]))
    }
}
