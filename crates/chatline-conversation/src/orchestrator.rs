use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chatline_agents::ReplyGenerator;
use chatline_common::{
    ActorId, Contact, ConversationId, CounterpartKind, Cursor, Error, ErrorKind, Page, Result,
    Turn, TurnRole,
};
use chatline_db::{CursorPager, TurnStore};
use chatline_security::{AdmissionControl, IdentityProvider, InputValidator};
use chrono::Duration as ChronoDuration;
use dashmap::DashSet;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, ClientCache};
use crate::notify::{Notifier, TurnNotification};

const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators shared by every chat surface.
#[derive(Clone)]
pub struct SharedServices {
    pub identity: Arc<dyn IdentityProvider>,
    pub admission: Arc<dyn AdmissionControl>,
    pub notifier: Arc<dyn Notifier>,
}

/// Result of [`ConversationOrchestrator::send_turn`].
///
/// `reply` is always present: either the counterpart's answer or a local
/// turn describing the failure.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The actor's turn, unless it was rolled back.
    pub sent: Option<Turn>,
    pub reply: Turn,
    pub error: Option<ErrorKind>,
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn failed(conversation: &ConversationId, error: &Error) -> Self {
        let kind = error.kind();
        Self {
            sent: None,
            reply: Turn::synthetic(conversation.clone(), kind.user_message()),
            error: Some(kind),
        }
    }
}

/// The operations one chat surface exposes to its UI: contacts, paged
/// history and sending turns, all routed through the client cache.
pub struct ConversationOrchestrator {
    store: Arc<dyn TurnStore>,
    pager: CursorPager,
    generator: Arc<ReplyGenerator>,
    cache: Arc<ClientCache>,
    services: SharedServices,
    page_size: usize,
    storage_timeout: Duration,
    loading_more: DashSet<CacheKey>,
}

/// Clears the in-flight mark for a key when the load finishes, however it
/// finishes.
struct InFlight<'a> {
    set: &'a DashSet<CacheKey>,
    key: CacheKey,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a DashSet<CacheKey>, key: CacheKey) -> Option<Self> {
        set.insert(key.clone()).then(|| Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn TurnStore>,
        generator: Arc<ReplyGenerator>,
        cache: Arc<ClientCache>,
        services: SharedServices,
    ) -> Self {
        Self {
            pager: CursorPager::new(Arc::clone(&store)),
            store,
            generator,
            cache,
            services,
            page_size: DEFAULT_PAGE_SIZE,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            loading_more: DashSet::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Probe the provider behind this surface's reply generator.
    #[instrument(skip(self), fields(namespace = self.namespace()))]
    pub async fn check_provider(&self) -> Result<bool> {
        let healthy = self.generator.health_check().await?;
        if healthy {
            info!(provider = self.generator.provider_id(), "provider reachable");
        } else {
            warn!(provider = self.generator.provider_id(), "provider unreachable");
        }
        Ok(healthy)
    }

    /// What the cache currently holds for a conversation, including
    /// optimistic turns of a send still in progress.
    pub fn cached_page(&self, conversation: &ConversationId) -> Result<Option<Page>> {
        let actor = self.services.identity.current_actor()?;
        Ok(self
            .cache
            .get(&CacheKey::turns(actor, conversation.clone()))
            .map(|entry| Page {
                turns: entry.items,
                has_more: entry.has_more,
            }))
    }

    #[instrument(skip(self), fields(namespace = self.namespace()))]
    pub async fn load_contacts(&self) -> Result<Vec<Contact>> {
        let actor = self.services.identity.current_actor()?;
        if let Some(entry) = self.cache.get_contacts(&actor) {
            debug!("contacts served from cache");
            return Ok(entry.items);
        }
        self.refresh_contacts(actor).await
    }

    /// Create a contact (no-op if it exists) and refresh the cached list.
    #[instrument(skip(self, display_name), fields(namespace = self.namespace()))]
    pub async fn add_contact(
        &self,
        conversation: ConversationId,
        display_name: &str,
        kind: CounterpartKind,
    ) -> Result<Contact> {
        let actor = self.services.identity.current_actor()?;
        let name = InputValidator::sanitize(display_name);
        if name.is_empty() {
            return Err(Error::General("contact name is empty".to_string()));
        }

        let contact = Contact::new(conversation, name, kind);
        let stored = self
            .storage("add_contact", self.store.add_contact(&actor, &contact))
            .await?;
        self.refresh_contacts(actor).await?;
        info!(contact = %stored.id, kind = %stored.kind, "contact added");
        Ok(stored)
    }

    async fn refresh_contacts(&self, actor: ActorId) -> Result<Vec<Contact>> {
        let contacts = self
            .storage("list_contacts", self.store.list_contacts(&actor))
            .await?;
        self.cache.put_contacts(actor, contacts.clone());
        Ok(contacts)
    }

    /// Newest page (cache first) or the page older than `cursor`, merged
    /// into the cache either way.
    #[instrument(skip(self), fields(namespace = self.namespace()))]
    pub async fn load_page(
        &self,
        conversation: &ConversationId,
        cursor: Option<&Cursor>,
    ) -> Result<Page> {
        let actor = self.services.identity.current_actor()?;
        let key = CacheKey::turns(actor.clone(), conversation.clone());

        match cursor {
            None => {
                if let Some(entry) = self.cache.get(&key) {
                    debug!(%key, "page served from cache");
                    return Ok(Page {
                        turns: entry.items,
                        has_more: entry.has_more,
                    });
                }
                let page = self.fetch_page(&actor, conversation, None).await?;
                self.cache.put(key, page.turns.clone(), page.has_more);
                Ok(page)
            }
            Some(cursor) => {
                let page = self.fetch_page(&actor, conversation, Some(cursor)).await?;
                self.cache.append(key, page.turns.clone(), page.has_more);
                Ok(page)
            }
        }
    }

    /// Load the page preceding the oldest cached turn.
    ///
    /// Returns `Ok(None)` without touching the store when nothing is cached,
    /// the cache says there is nothing older, or a load for the same key is
    /// already running.
    #[instrument(skip(self), fields(namespace = self.namespace()))]
    pub async fn load_more(&self, conversation: &ConversationId) -> Result<Option<Page>> {
        let actor = self.services.identity.current_actor()?;
        let key = CacheKey::turns(actor.clone(), conversation.clone());

        let Some(_in_flight) = InFlight::acquire(&self.loading_more, key.clone()) else {
            debug!(%key, "load already in flight");
            return Ok(None);
        };

        let Some(entry) = self.cache.get(&key) else {
            return Ok(None);
        };
        if !entry.has_more {
            return Ok(None);
        }
        let Some(cursor) = entry.cursor() else {
            return Ok(None);
        };

        let page = self.fetch_page(&actor, conversation, Some(&cursor)).await?;
        self.cache.append(key, page.turns.clone(), page.has_more);
        Ok(Some(page))
    }

    /// Send `text` and wait for the counterpart's reply.
    ///
    /// The actor's turn is cached before any I/O. Never fails: on error the
    /// optimistic turn is rolled back and a local turn carrying a message
    /// for the error kind takes the reply's place in the cache.
    #[instrument(skip(self, text), fields(namespace = self.namespace()))]
    pub async fn send_turn(&self, conversation: &ConversationId, text: &str) -> SendOutcome {
        let actor = match self.services.identity.current_actor() {
            Ok(actor) => actor,
            Err(e) => {
                warn!("send rejected: {e}");
                return SendOutcome::failed(conversation, &e);
            }
        };
        let key = CacheKey::turns(actor.clone(), conversation.clone());

        let max_chars = self.generator.limits().max_input_chars;
        let text = match InputValidator::validate_message(text, max_chars) {
            Ok(text) => text,
            Err(e) => {
                warn!(%key, "send rejected: {e}");
                return self.inject_failure(key, conversation, &e);
            }
        };

        let cached = self.cache.get(&key);
        let turn = Turn::new(conversation.clone(), TurnRole::Actor, text);
        self.cache.push_latest(key.clone(), turn.clone());

        let result: Result<Turn> = async {
            let history = match cached {
                Some(entry) => entry.items,
                None => self.prime(&actor, &key, conversation).await?,
            };
            self.exchange(&actor, &turn, &history).await
        }
        .await;

        match result {
            Ok(reply) => {
                self.cache.push_latest(key, reply.clone());
                self.emit(&actor, conversation, &reply);
                info!(turn = %turn.id, reply = %reply.id, "exchange complete");
                SendOutcome {
                    sent: Some(turn),
                    reply,
                    error: None,
                }
            }
            Err(e) => {
                warn!(%key, kind = %e.kind(), "send failed, rolling back: {e}");
                self.cache.remove(&key, &turn.id);
                self.inject_failure(key, conversation, &e)
            }
        }
    }

    /// Merge the newest stored page under the optimistic turn and return
    /// it as history.
    async fn prime(
        &self,
        actor: &ActorId,
        key: &CacheKey,
        conversation: &ConversationId,
    ) -> Result<Vec<Turn>> {
        let page = self.fetch_page(actor, conversation, None).await?;
        self.cache.append(key.clone(), page.turns.clone(), page.has_more);
        Ok(page.turns)
    }

    fn inject_failure(
        &self,
        key: CacheKey,
        conversation: &ConversationId,
        error: &Error,
    ) -> SendOutcome {
        let outcome = SendOutcome::failed(conversation, error);
        self.cache.push_latest(key, outcome.reply.clone());
        outcome
    }

    /// Persist, admit, generate, persist. The actor's turn stays stored if a
    /// later step fails; turns are append-only.
    async fn exchange(&self, actor: &ActorId, turn: &Turn, history: &[Turn]) -> Result<Turn> {
        self.storage("append_turn", self.store.append_turn(actor, turn))
            .await?;

        self.services.admission.check_and_consume(actor)?;

        let kind = self.counterpart_kind(actor, &turn.conversation_id).await?;
        let text = self
            .generator
            .generate_reply(actor, &turn.text, history, kind)
            .await
            .map_err(Error::into_taxonomy)?;

        let mut reply = Turn::new(turn.conversation_id.clone(), TurnRole::Counterpart, text);
        if reply.created_at <= turn.created_at {
            reply = Turn::at(
                reply.conversation_id,
                TurnRole::Counterpart,
                reply.text,
                turn.created_at + ChronoDuration::microseconds(1),
            );
        }

        self.storage("append_turn", self.store.append_turn(actor, &reply))
            .await?;
        Ok(reply)
    }

    async fn counterpart_kind(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
    ) -> Result<CounterpartKind> {
        let contact = self
            .storage("get_contact", self.store.get_contact(actor, conversation))
            .await?;
        Ok(match contact {
            Some(contact) => contact.kind,
            None => {
                warn!(%conversation, "no contact record, using default counterpart");
                CounterpartKind::default()
            }
        })
    }

    fn emit(&self, actor: &ActorId, conversation: &ConversationId, turn: &Turn) {
        let event = TurnNotification {
            namespace: self.namespace().to_string(),
            actor: actor.clone(),
            conversation: conversation.clone(),
            turn: turn.clone(),
        };
        if let Err(e) = self.services.notifier.notify(&event) {
            warn!("notification failed: {e}");
        }
    }

    async fn fetch_page(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        cursor: Option<&Cursor>,
    ) -> Result<Page> {
        self.storage(
            "page",
            self.pager.page(actor, conversation, self.page_size, cursor),
        )
        .await
    }

    /// Bound a store call by the storage timeout and fold any failure into
    /// [`Error::Storage`].
    async fn storage<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.storage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, "store call failed: {e}");
                Err(Error::Storage(format!("{operation}: {e}")))
            }
            Err(_) => Err(Error::Storage(format!(
                "{operation} timed out after {:?}",
                self.storage_timeout
            ))),
        }
    }
}
