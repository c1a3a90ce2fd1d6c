use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::{ConversationId, TurnId};

/// One message in a conversation. Turns are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub conversation_id: ConversationId,
    pub role: TurnRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set on turns produced locally (optimistic or error replies) that
    /// were never read back from the store.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Actor,
    Counterpart,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::Actor => "actor",
            TurnRole::Counterpart => "counterpart",
        }
    }
}

impl FromStr for TurnRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(TurnRole::Actor),
            "counterpart" => Ok(TurnRole::Counterpart),
            other => Err(Error::Database(format!("unknown turn role '{other}'"))),
        }
    }
}

impl Turn {
    pub fn new(conversation_id: ConversationId, role: TurnRole, text: impl Into<String>) -> Self {
        Self::at(conversation_id, role, text, now_micros())
    }

    /// A turn stamped with an explicit creation time, truncated to
    /// microseconds.
    pub fn at(
        conversation_id: ConversationId,
        role: TurnRole,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let created_at = truncate_micros(created_at);
        Self {
            id: TurnId::generate(created_at),
            conversation_id,
            role,
            text: text.into(),
            created_at,
            local: false,
        }
    }

    /// A counterpart turn that exists only on the client, e.g. an error
    /// notice injected after a failed send.
    pub fn synthetic(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            local: true,
            ..Self::new(conversation_id, TurnRole::Counterpart, text)
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at_micros: self.created_at.timestamp_micros(),
            turn_id: self.id.clone(),
        }
    }

    /// Ordering key shared by the store, the pager and the cache.
    pub fn sort_key(&self) -> (i64, &TurnId) {
        (self.created_at.timestamp_micros(), &self.id)
    }
}

/// Current time truncated to the microsecond precision the store keeps.
pub fn now_micros() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

fn truncate_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap_or(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartKind {
    Scripted,
    #[default]
    Default,
}

impl CounterpartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartKind::Scripted => "scripted",
            CounterpartKind::Default => "default",
        }
    }
}

impl fmt::Display for CounterpartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterpartKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scripted" => Ok(CounterpartKind::Scripted),
            "default" => Ok(CounterpartKind::Default),
            other => Err(Error::General(format!("unknown counterpart kind '{other}'"))),
        }
    }
}

/// A counterpart an actor can exchange turns with. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ConversationId,
    pub display_name: String,
    pub kind: CounterpartKind,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(
        id: impl Into<ConversationId>,
        display_name: impl Into<String>,
        kind: CounterpartKind,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            created_at: now_micros(),
        }
    }
}

/// Opaque pagination token pointing at the oldest turn a caller holds.
///
/// The turn id breaks ties between turns that share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at_micros: i64,
    pub turn_id: TurnId,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.created_at_micros, self.turn_id)
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (micros, id) = s
            .split_once(':')
            .ok_or_else(|| Error::General(format!("invalid cursor '{s}'")))?;
        let created_at_micros = micros
            .parse::<i64>()
            .map_err(|_| Error::General(format!("invalid cursor timestamp '{micros}'")))?;
        if id.is_empty() {
            return Err(Error::General("cursor is missing a turn id".to_string()));
        }
        Ok(Self {
            created_at_micros,
            turn_id: TurnId::new(id),
        })
    }
}

/// A page of turns in ascending (chronological) order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub turns: Vec<Turn>,
    pub has_more: bool,
}

impl Page {
    /// Cursor for the next older page, if this page holds any turns.
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.turns.first().map(Turn::cursor)
    }
}
