use chatline_common::{ActorId, ConversationId, Error, Result, Turn};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// "New message" event emitted after a counterpart reply lands.
#[derive(Debug, Clone, Serialize)]
pub struct TurnNotification {
    pub namespace: String,
    pub actor: ActorId,
    pub conversation: ConversationId,
    pub turn: Turn,
}

/// Fire-and-forget presentation channel. Callers never await delivery and
/// treat an error as non-fatal.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TurnNotification) -> Result<()>;
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &TurnNotification) -> Result<()> {
        Ok(())
    }
}

/// Fans notifications out to every subscriber of a broadcast channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TurnNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnNotification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &TurnNotification) -> Result<()> {
        if self.tx.receiver_count() == 0 {
            debug!("no notification subscribers");
            return Ok(());
        }
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| Error::General(format!("notification dropped: {e}")))
    }
}
