use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chatline_common::{
    ActorId, Contact, ConversationId, CounterpartKind, Cursor, Error, Result, Turn, TurnId,
    TurnRole,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::profiles::{CounterpartProfile, ProfileResolver};

/// Append-only persistence of turns, addressed `actor -> conversation -> turn`.
///
/// Reads return turns newest first; callers that need chronological order
/// go through [`crate::CursorPager`].
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Namespace separating the chat surfaces that share one database.
    fn namespace(&self) -> &str;

    /// Insert a contact unless one with the same id exists. Returns the
    /// stored contact, which is the original on conflict.
    async fn add_contact(&self, actor: &ActorId, contact: &Contact) -> Result<Contact>;

    async fn list_contacts(&self, actor: &ActorId) -> Result<Vec<Contact>>;

    async fn get_contact(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
    ) -> Result<Option<Contact>>;

    /// Append a turn. Writing the same id twice keeps the last write.
    async fn append_turn(&self, actor: &ActorId, turn: &Turn) -> Result<()>;

    /// Newest `limit` turns, descending.
    async fn recent_turns(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>>;

    /// Up to `limit` turns strictly older than `cursor`, descending.
    async fn turns_before(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<Vec<Turn>>;
}

/// [`TurnStore`] over a SQLite database.
pub struct SqliteTurnStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl SqliteTurnStore {
    pub fn open(db_path: &Path, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        info!(
            "opening turn store '{}' at {}",
            namespace,
            db_path.display()
        );
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            namespace,
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory(namespace: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            namespace: namespace.into(),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS contacts (
                    namespace TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    display_name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (namespace, actor_id, id)
                );

                CREATE TABLE IF NOT EXISTS turns (
                    namespace TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    text TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (namespace, actor_id, conversation_id, id)
                );

                CREATE INDEX IF NOT EXISTS idx_turns_conversation_time
                    ON turns(namespace, actor_id, conversation_id, created_at, id);

                CREATE TABLE IF NOT EXISTS counterpart_profiles (
                    namespace TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    document TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (namespace, kind)
                );",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Database("turn store connection poisoned".to_string()))?;
        f(&conn)
    }

    /// Store or replace the profile document for a counterpart kind.
    pub fn put_profile(&self, kind: CounterpartKind, profile: &CounterpartProfile) -> Result<()> {
        let document = serde_json::to_string(profile)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO counterpart_profiles (namespace, kind, document)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace, kind) DO UPDATE SET
                   document = excluded.document,
                   updated_at = datetime('now')",
                params![self.namespace, kind.as_str(), document],
            )
            .map_err(|e| Error::Database(format!("failed to store profile: {e}")))?;
            Ok(())
        })
    }

    fn load_profile(&self, kind: CounterpartKind) -> Result<Option<CounterpartProfile>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT document FROM counterpart_profiles WHERE namespace = ?1 AND kind = ?2",
                params![self.namespace, kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load profile: {e}")))
        })?;

        match raw {
            Some(document) => serde_json::from_str(&document).map(Some).map_err(|e| {
                Error::Database(format!("profile document for '{kind}' is invalid: {e}"))
            }),
            None => Ok(None),
        }
    }

    fn insert_contact(&self, actor: &ActorId, contact: &Contact) -> Result<Contact> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contacts (namespace, actor_id, id, display_name, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(namespace, actor_id, id) DO NOTHING",
                params![
                    self.namespace,
                    actor.as_str(),
                    contact.id.as_str(),
                    contact.display_name,
                    contact.kind.as_str(),
                    contact.created_at.timestamp_micros()
                ],
            )
            .map_err(|e| Error::Database(format!("failed to add contact: {e}")))?;
            Ok(())
        })?;

        self.select_contact(actor, &contact.id)?
            .ok_or_else(|| Error::Database("contact vanished after insert".to_string()))
    }

    fn select_contacts(&self, actor: &ActorId) -> Result<Vec<Contact>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, display_name, kind, created_at
                     FROM contacts
                     WHERE namespace = ?1 AND actor_id = ?2
                     ORDER BY created_at ASC, id ASC",
                )
                .map_err(|e| Error::Database(format!("failed to prepare contact query: {e}")))?;

            let rows = stmt
                .query_map(params![self.namespace, actor.as_str()], ContactRow::from_row)
                .map_err(|e| Error::Database(format!("failed to load contacts: {e}")))?;
            collect_rows(rows)
        })?;

        rows.into_iter().map(ContactRow::into_contact).collect()
    }

    fn select_contact(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
    ) -> Result<Option<Contact>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, display_name, kind, created_at
                 FROM contacts
                 WHERE namespace = ?1 AND actor_id = ?2 AND id = ?3",
                params![self.namespace, actor.as_str(), conversation.as_str()],
                ContactRow::from_row,
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load contact: {e}")))
        })?;

        row.map(ContactRow::into_contact).transpose()
    }

    fn insert_turn(&self, actor: &ActorId, turn: &Turn) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO turns (namespace, actor_id, conversation_id, id, role, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(namespace, actor_id, conversation_id, id) DO UPDATE SET
                   role = excluded.role,
                   text = excluded.text,
                   created_at = excluded.created_at",
                params![
                    self.namespace,
                    actor.as_str(),
                    turn.conversation_id.as_str(),
                    turn.id.as_str(),
                    turn.role.as_str(),
                    turn.text,
                    turn.created_at.timestamp_micros()
                ],
            )
            .map_err(|e| Error::Database(format!("failed to append turn: {e}")))?;
            Ok(())
        })?;
        debug!(
            actor = %actor,
            conversation = %turn.conversation_id,
            turn = %turn.id,
            "turn appended"
        );
        Ok(())
    }

    fn select_turns(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        let rows = self.with_conn(|conn| match cursor {
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT conversation_id, id, role, text, created_at
                         FROM turns
                         WHERE namespace = ?1 AND actor_id = ?2 AND conversation_id = ?3
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?4",
                    )
                    .map_err(|e| Error::Database(format!("failed to prepare turn query: {e}")))?;
                let rows = stmt
                    .query_map(
                        params![
                            self.namespace,
                            actor.as_str(),
                            conversation.as_str(),
                            limit as i64
                        ],
                        TurnRow::from_row,
                    )
                    .map_err(|e| Error::Database(format!("failed to load turns: {e}")))?;
                collect_rows(rows)
            }
            Some(cursor) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT conversation_id, id, role, text, created_at
                         FROM turns
                         WHERE namespace = ?1 AND actor_id = ?2 AND conversation_id = ?3
                           AND (created_at < ?4 OR (created_at = ?4 AND id < ?5))
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?6",
                    )
                    .map_err(|e| Error::Database(format!("failed to prepare turn query: {e}")))?;
                let rows = stmt
                    .query_map(
                        params![
                            self.namespace,
                            actor.as_str(),
                            conversation.as_str(),
                            cursor.created_at_micros,
                            cursor.turn_id.as_str(),
                            limit as i64
                        ],
                        TurnRow::from_row,
                    )
                    .map_err(|e| Error::Database(format!("failed to load turns: {e}")))?;
                collect_rows(rows)
            }
        })?;

        rows.into_iter().map(TurnRow::into_turn).collect()
    }

    /// Count turns stored for a conversation.
    pub fn count_turns(&self, actor: &ActorId, conversation: &ConversationId) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM turns
                 WHERE namespace = ?1 AND actor_id = ?2 AND conversation_id = ?3",
                params![self.namespace, actor.as_str(), conversation.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to count turns: {e}")))
        })
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn add_contact(&self, actor: &ActorId, contact: &Contact) -> Result<Contact> {
        self.insert_contact(actor, contact)
    }

    async fn list_contacts(&self, actor: &ActorId) -> Result<Vec<Contact>> {
        self.select_contacts(actor)
    }

    async fn get_contact(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
    ) -> Result<Option<Contact>> {
        self.select_contact(actor, conversation)
    }

    async fn append_turn(&self, actor: &ActorId, turn: &Turn) -> Result<()> {
        self.insert_turn(actor, turn)
    }

    async fn recent_turns(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        self.select_turns(actor, conversation, None, limit)
    }

    async fn turns_before(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        self.select_turns(actor, conversation, Some(cursor), limit)
    }
}

#[async_trait]
impl ProfileResolver for SqliteTurnStore {
    async fn resolve(&self, kind: CounterpartKind) -> Result<Option<CounterpartProfile>> {
        self.load_profile(kind)
    }
}

struct ContactRow {
    id: String,
    display_name: String,
    kind: String,
    created_at: i64,
}

impl ContactRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            display_name: row.get(1)?,
            kind: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_contact(self) -> Result<Contact> {
        Ok(Contact {
            id: ConversationId::new(self.id),
            display_name: self.display_name,
            kind: self
                .kind
                .parse()
                .map_err(|e| Error::Database(format!("invalid contact row: {e}")))?,
            created_at: parse_micros(self.created_at)?,
        })
    }
}

struct TurnRow {
    conversation_id: String,
    id: String,
    role: String,
    text: String,
    created_at: i64,
}

impl TurnRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            id: row.get(1)?,
            role: row.get(2)?,
            text: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_turn(self) -> Result<Turn> {
        Ok(Turn {
            id: TurnId::new(self.id),
            conversation_id: ConversationId::new(self.conversation_id),
            role: self.role.parse::<TurnRole>()?,
            text: self.text,
            created_at: parse_micros(self.created_at)?,
            local: false,
        })
    }
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row.map_err(|e| Error::Database(format!("failed to read row: {e}")))?);
    }
    Ok(collected)
}

fn parse_micros(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| Error::Database(format!("timestamp {value} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ScriptedExchange;
    use chrono::Duration;

    fn actor() -> ActorId {
        ActorId::new("u1")
    }

    fn conversation() -> ConversationId {
        ConversationId::new("c1")
    }

    fn turn_at(micros: i64, id: &str, text: &str) -> Turn {
        Turn {
            id: TurnId::new(id),
            conversation_id: conversation(),
            role: TurnRole::Actor,
            text: text.to_string(),
            created_at: DateTime::from_timestamp_micros(micros).unwrap(),
            local: false,
        }
    }

    #[tokio::test]
    async fn append_and_load_recent_turns_round_trip() {
        let store = SqliteTurnStore::in_memory("dm").expect("in-memory store should open");

        let hello = Turn::new(conversation(), TurnRole::Actor, "hello");
        let mut reply = Turn::new(conversation(), TurnRole::Counterpart, "hi there");
        reply.created_at = hello.created_at + Duration::milliseconds(5);

        store.append_turn(&actor(), &hello).await.unwrap();
        store.append_turn(&actor(), &reply).await.unwrap();

        let turns = store
            .recent_turns(&actor(), &conversation(), 10)
            .await
            .expect("turn load should succeed");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], reply);
        assert_eq!(turns[1], hello);
    }

    #[tokio::test]
    async fn explicitly_stamped_turn_reads_back_unchanged() {
        let store = SqliteTurnStore::in_memory("dm").unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 945_604_830).unwrap();
        let turn = Turn::at(conversation(), TurnRole::Actor, "hello", at);

        store.append_turn(&actor(), &turn).await.unwrap();

        let turns = store.recent_turns(&actor(), &conversation(), 1).await.unwrap();
        assert_eq!(turns, vec![turn.clone()]);
        assert_eq!(turns[0].cursor(), turn.cursor());
    }

    #[tokio::test]
    async fn appending_same_id_twice_keeps_one_row() {
        let store = SqliteTurnStore::in_memory("dm").unwrap();
        let mut turn = Turn::new(conversation(), TurnRole::Actor, "first");

        store.append_turn(&actor(), &turn).await.unwrap();
        turn.text = "second".to_string();
        store.append_turn(&actor(), &turn).await.unwrap();

        assert_eq!(store.count_turns(&actor(), &conversation()).unwrap(), 1);
        let turns = store.recent_turns(&actor(), &conversation(), 5).await.unwrap();
        assert_eq!(turns[0].text, "second");
    }

    #[tokio::test]
    async fn turns_before_breaks_timestamp_ties_by_id() {
        let store = SqliteTurnStore::in_memory("dm").unwrap();
        for (micros, id) in [(100, "a"), (200, "b"), (200, "c"), (300, "d")] {
            store
                .append_turn(&actor(), &turn_at(micros, id, id))
                .await
                .unwrap();
        }

        let cursor = turn_at(200, "c", "c").cursor();
        let older = store
            .turns_before(&actor(), &conversation(), &cursor, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = older.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn namespaces_and_actors_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let direct = SqliteTurnStore::open(&path, "dm").unwrap();
        let messenger = SqliteTurnStore::open(&path, "im").unwrap();

        direct
            .append_turn(&actor(), &Turn::new(conversation(), TurnRole::Actor, "dm"))
            .await
            .unwrap();

        assert!(
            messenger
                .recent_turns(&actor(), &conversation(), 10)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            direct
                .recent_turns(&ActorId::new("u2"), &conversation(), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn contacts_are_immutable_after_first_add() {
        let store = SqliteTurnStore::in_memory("im").unwrap();
        let original = Contact::new("c1", "IT Support", CounterpartKind::Scripted);
        let stored = store.add_contact(&actor(), &original).await.unwrap();
        assert_eq!(stored, original);

        let renamed = Contact::new("c1", "Someone Else", CounterpartKind::Default);
        let again = store.add_contact(&actor(), &renamed).await.unwrap();
        assert_eq!(again.display_name, "IT Support");
        assert_eq!(again.kind, CounterpartKind::Scripted);

        store
            .add_contact(&actor(), &Contact::new("c2", "Bank", CounterpartKind::Default))
            .await
            .unwrap();
        let contacts = store.list_contacts(&actor()).await.unwrap();
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].id.as_str(), "c1");

        assert!(
            store
                .get_contact(&actor(), &ConversationId::new("missing"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn profiles_resolve_per_namespace_and_kind() {
        let store = SqliteTurnStore::in_memory("dm").unwrap();
        assert!(store.resolve(CounterpartKind::Default).await.unwrap().is_none());

        let profile = CounterpartProfile {
            instructions: "You are a suspicious stranger.".to_string(),
            script: vec![ScriptedExchange {
                question: "Who is this?".to_string(),
                answer: "A friend of a friend.".to_string(),
            }],
        };
        store.put_profile(CounterpartKind::Scripted, &profile).unwrap();

        assert_eq!(
            store.resolve(CounterpartKind::Scripted).await.unwrap(),
            Some(profile)
        );
        assert!(store.resolve(CounterpartKind::Default).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_profile_document_is_a_database_error() {
        let store = SqliteTurnStore::in_memory("dm").unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO counterpart_profiles (namespace, kind, document)
                     VALUES ('dm', 'default', 'not json')",
                    [],
                )
                .map_err(|e| Error::Database(e.to_string()))
            })
            .unwrap();

        let err = store.resolve(CounterpartKind::Default).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
