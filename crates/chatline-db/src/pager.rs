use std::sync::Arc;

use chatline_common::{ActorId, ConversationId, Cursor, Page, Result};
use tracing::{debug, instrument};

use crate::turn_store::TurnStore;

/// Keyset pagination over a [`TurnStore`].
///
/// Each request asks the store for one row more than the page size; the
/// presence of that extra row answers "is there more?" without a second
/// round trip.
#[derive(Clone)]
pub struct CursorPager {
    store: Arc<dyn TurnStore>,
}

impl CursorPager {
    pub fn new(store: Arc<dyn TurnStore>) -> Self {
        Self { store }
    }

    /// Fetch the newest page, or the page strictly older than `cursor`.
    /// Turns come back in ascending order.
    #[instrument(skip(self), fields(namespace = self.store.namespace()))]
    pub async fn page(
        &self,
        actor: &ActorId,
        conversation: &ConversationId,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page> {
        let page_size = page_size.max(1);
        let limit = page_size + 1;

        let mut turns = match cursor {
            Some(cursor) => {
                self.store
                    .turns_before(actor, conversation, cursor, limit)
                    .await?
            }
            None => self.store.recent_turns(actor, conversation, limit).await?,
        };

        let has_more = turns.len() > page_size;
        turns.truncate(page_size);
        turns.reverse();

        debug!(count = turns.len(), has_more, "page fetched");
        Ok(Page { turns, has_more })
    }
}
